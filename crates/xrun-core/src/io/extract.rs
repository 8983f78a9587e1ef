//! Archive extraction and inspection.
//!
//! Handles tar (plain, gzip, xz, bzip2, zstd) and zip, dispatching on the archive
//! file name.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use thiserror::Error;
use zip::ZipArchive;
use zstd::stream::Decoder as ZstdDecoder;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Invalid path in archive: {0}")]
    UnsafePath(String),
}

/// Archive formats recognized by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarXz,
    TarBz2,
    TarZst,
    Tar,
    Zip,
}

impl ArchiveFormat {
    /// Detect format from a file name, case-insensitively.
    pub fn detect(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz")
        {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Some(Self::TarZst)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    fn of_path(path: &Path) -> Result<Self, ExtractError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::detect(&name).ok_or(ExtractError::UnsupportedFormat(name))
    }
}

/// Information about an extracted file
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    /// Path relative to extraction root
    pub relative_path: PathBuf,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// Whether this is an executable
    pub is_executable: bool,
}

/// A regular file inside an archive, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// `/` separated path inside the archive.
    pub path: String,
    /// Any execute bit set in the stored mode.
    pub is_executable: bool,
}

impl ArchiveEntry {
    /// Last path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Relative path of an entry, rejecting anything that would land outside
/// the extraction root.
fn safe_relative(path: &Path) -> Result<PathBuf, ExtractError> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::UnsafePath(path.display().to_string()));
            }
        }
    }
    Ok(out)
}

/// Whether a symlink at `link` pointing at `target` resolves inside the
/// extraction root.
fn link_stays_inside(link: &Path, target: &Path) -> bool {
    let mut depth = link.components().count().saturating_sub(1);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn open_tar(archive_path: &Path, format: ArchiveFormat) -> Result<Box<dyn Read>, ExtractError> {
    let reader = BufReader::new(File::open(archive_path)?);
    Ok(match format {
        ArchiveFormat::TarGz => Box::new(flate2::read::GzDecoder::new(reader)),
        ArchiveFormat::TarXz => Box::new(xz2::read::XzDecoder::new(reader)),
        ArchiveFormat::TarBz2 => Box::new(BzDecoder::new(reader)),
        ArchiveFormat::TarZst => Box::new(ZstdDecoder::new(reader)?),
        ArchiveFormat::Tar => Box::new(reader),
        ArchiveFormat::Zip => {
            return Err(ExtractError::UnsupportedFormat(
                archive_path.display().to_string(),
            ));
        }
    })
}

/// Extract an archive into `dest_dir`, detecting the format from the
/// archive file name.
pub fn unpack(archive_path: &Path, dest_dir: &Path) -> Result<Vec<ExtractedFile>, ExtractError> {
    match ArchiveFormat::of_path(archive_path)? {
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir),
        format => extract_tar(open_tar(archive_path, format)?, dest_dir),
    }
}

/// Extract a tar archive from a reader.
///
/// Link entries must point inside the archive. Every entry goes through
/// `unpack_in`, which refuses to write through a parent that resolves
/// outside `dest_dir`.
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<ExtractedFile>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    let mut extracted_files = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative_path = safe_relative(&entry.path()?)?;
        if relative_path.as_os_str().is_empty() {
            continue;
        }
        let absolute_path = dest_dir.join(&relative_path);

        let entry_type = entry.header().entry_type();
        if let Some(target) = entry.link_name()? {
            let inside = if entry_type.is_hard_link() {
                safe_relative(&target).is_ok()
            } else {
                !entry_type.is_symlink() || link_stays_inside(&relative_path, &target)
            };
            if !inside {
                return Err(ExtractError::UnsafePath(format!(
                    "{} -> {}",
                    relative_path.display(),
                    target.display()
                )));
            }
        }

        if !entry.unpack_in(dest_dir)? {
            return Err(ExtractError::UnsafePath(relative_path.display().to_string()));
        }
        if entry_type.is_dir() {
            continue;
        }

        let is_executable = entry
            .header()
            .mode()
            .map(|m| m & 0o111 != 0)
            .unwrap_or(false);

        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
            is_executable,
        });
    }

    Ok(extracted_files)
}

/// Extract a zip archive
fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<ExtractedFile>, ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;

    fs::create_dir_all(dest_dir)?;
    let mut extracted_files = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let relative_path = match file.enclosed_name() {
            Some(path) => safe_relative(&path)?,
            None => return Err(ExtractError::UnsafePath(file.name().to_string())),
        };

        let absolute_path = dest_dir.join(&relative_path);
        if file.is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }

        if let Some(p) = absolute_path.parent() {
            fs::create_dir_all(p)?;
        }

        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        let is_executable = if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode & 0o7777))?;
            mode & 0o111 != 0
        } else {
            false
        };
        #[cfg(not(unix))]
        let is_executable = false;

        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
            is_executable,
        });
    }

    Ok(extracted_files)
}

/// Regular file entries of an archive, without extracting anything.
pub fn list_entries(archive_path: &Path) -> Result<Vec<ArchiveEntry>, ExtractError> {
    let format = ArchiveFormat::of_path(archive_path)?;
    let mut entries = Vec::new();

    if format == ArchiveFormat::Zip {
        let file = File::open(archive_path)?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;
        for i in 0..archive.len() {
            let file = archive
                .by_index_raw(i)
                .map_err(|e| ExtractError::Archive(e.to_string()))?;
            if file.is_file() {
                entries.push(ArchiveEntry {
                    path: file.name().to_string(),
                    is_executable: file.unix_mode().is_some_and(|m| m & 0o111 != 0),
                });
            }
        }
        return Ok(entries);
    }

    let mut archive = tar::Archive::new(open_tar(archive_path, format)?);
    for entry in archive.entries()? {
        let entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        entries.push(ArchiveEntry {
            path: entry.path()?.to_string_lossy().replace('\\', "/"),
            is_executable: entry.header().mode().is_ok_and(|m| m & 0o111 != 0),
        });
    }
    Ok(entries)
}

/// Path of the entry named `tool_exe`, preferring one with execute bits.
pub fn find_tool(archive_path: &Path, tool_exe: &str) -> Result<Option<String>, ExtractError> {
    let entries = list_entries(archive_path)?;
    let mut candidates = entries.iter().filter(|e| e.file_name() == tool_exe);
    let first = candidates.clone().next();
    Ok(candidates
        .find(|e| e.is_executable)
        .or(first)
        .map(|e| e.path.trim_start_matches("./").to_string()))
}
