//! The fetch, verify, cache and run pipeline.
//!
//! ```text
//! select URL -> select archive path -> parse digest -> cache address
//!   -> launch from cache ---------------------------------> done
//!        | miss
//!        v
//!      fetch -> verify -> materialize -> chmod -> metadata -> launch
//! ```
//!
//! The cached launch is attempted before any network activity, so a warm
//! cache never touches the network. Every step after a cache miss is fatal
//! except writing the metadata sidecar.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use xrun_schema::matcher::{self, MatcherError};
use xrun_schema::{HashError, HashSpec, Platform, PlatformMatch};

use crate::cache::{CacheAddress, CacheError, CachedArtifact};
use crate::io::download::{DownloadError, Fetcher};
use crate::io::exec::{Launcher, check_runnable, make_executable};
use crate::io::extract::{self, ExtractError};
use crate::paths;

/// Default limit for the whole download.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Process exit code for operational failures.
pub const EXIT_FAILURE: u8 = 1;
/// Process exit code for usage and configuration errors.
pub const EXIT_USAGE: u8 = 2;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("{0}")]
    Matcher(#[from] MatcherError),

    #[error("parse hash fragment: {0}")]
    Hash(#[from] HashError),

    #[error("cache setup: {0}")]
    Address(#[from] CacheError),

    #[error("cache setup: cannot determine cache directory, set {}", paths::CACHE_HOME_ENV)]
    NoCacheDir,

    #[error("no URL available for OS/architecture {0}")]
    NoUrl(Platform),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("download: {0}")]
    Download(#[from] DownloadError),

    #[error("unarchive: {0}")]
    Extract(#[from] ExtractError),

    #[error("exec {}: {source}", path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RunError {
    fn io(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { context, source }
    }

    /// Process exit code: usage for bad arguments, failure otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Matcher(_) | Self::Hash(_) | Self::Address(_) => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }
}

/// Everything one invocation needs, fixed before the pipeline starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// URL matchers, in priority order.
    pub urls: Vec<PlatformMatch<Url>>,
    /// Archive executable path matchers, in priority order.
    pub archive_paths: Vec<PlatformMatch<String>>,
    /// Download time limit, zero for none.
    pub http_timeout: Duration,
    /// Check the executable instead of launching it.
    pub dry_run: bool,
    /// Platform matched against.
    pub platform: Platform,
    /// Versioned cache root.
    pub cache_root: PathBuf,
}

impl RunConfig {
    /// Config with platform and cache root taken from the environment.
    pub fn from_env(
        urls: Vec<PlatformMatch<Url>>,
        archive_paths: Vec<PlatformMatch<String>>,
    ) -> Result<Self, RunError> {
        Ok(Self {
            urls,
            archive_paths,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            dry_run: false,
            platform: paths::runtime_platform(),
            cache_root: paths::cache_root().ok_or(RunError::NoCacheDir)?,
        })
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The launcher returned control after starting `program`.
    Launched {
        /// Executable handed to the launcher.
        program: PathBuf,
    },
    /// Dry run found a regular file at `program`.
    DryRun {
        /// Executable that would have been launched.
        program: PathBuf,
    },
}

/// Launch from cache, or a dry-run check of the same.
fn start(
    config: &RunConfig,
    launcher: &dyn Launcher,
    program: &Path,
    args: &[OsString],
) -> io::Result<Outcome> {
    let program_buf = program.to_path_buf();
    if config.dry_run {
        info!("exec (...not, stat due to dry-run): {} {args:?}", program.display());
        check_runnable(program)?;
        return Ok(Outcome::DryRun {
            program: program_buf,
        });
    }
    info!("exec: {} {args:?}", program.display());
    launcher.launch(program, args)?;
    Ok(Outcome::Launched {
        program: program_buf,
    })
}

/// Temp file suffix keeping the extension the unpacker dispatches on.
pub(crate) fn temp_suffix(basename: &str) -> String {
    let mut name = basename.to_lowercase();
    if let Some(stem) = name.strip_suffix(".whl") {
        name = format!("{stem}.zip");
    }
    format!("-{name}")
}

fn remove_existing(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Move a verified download into place.
///
/// Archives are unpacked next to their final location and swapped in, so
/// a concurrent run sees either the old tree or the new one.
fn materialize(tmp: NamedTempFile, artifact: &CachedArtifact) -> Result<(), RunError> {
    if !artifact.is_archive() {
        remove_existing(&artifact.executable_path)
            .map_err(RunError::io("remove stale download"))?;
        tmp.persist(&artifact.executable_path)
            .map_err(|e| RunError::io("rename tempfile")(e.error))?;
        return Ok(());
    }

    let parent = artifact
        .download_path
        .parent()
        .unwrap_or_else(|| Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(".xrun-unpack")
        .tempdir_in(parent)
        .map_err(RunError::io("set up unpack dir"))?;
    let files = extract::unpack(tmp.path(), staging.path())?;
    info!("unpacked {} files", files.len());

    remove_existing(&artifact.download_path).map_err(RunError::io("remove stale download"))?;
    fs::rename(staging.path(), &artifact.download_path)
        .map_err(RunError::io("move unpacked archive"))?;
    Ok(())
}

/// Resolve, fetch if needed, and launch.
///
/// `args` are passed through to the executable untouched.
pub async fn run(
    config: &RunConfig,
    args: &[OsString],
    launcher: &dyn Launcher,
) -> Result<Outcome, RunError> {
    let platform = &config.platform;
    info!("OS/arch: {platform}");

    let url = matcher::select(platform, &config.urls)
        .ok_or_else(|| RunError::NoUrl(platform.clone()))?;
    info!("URL: {url}");

    let archive_path = matcher::select_archive_path(platform, &config.archive_paths);
    let hash = HashSpec::parse_fragment(url.fragment().unwrap_or_default())?;

    let address = CacheAddress::new(&config.cache_root, url, hash.as_ref())?;
    let artifact = address.artifact(archive_path.as_deref());
    fs::create_dir_all(address.dir()).map_err(RunError::io("cache setup"))?;
    info!("path to executable: {}", artifact.executable_path.display());

    match start(config, launcher, &artifact.executable_path, args) {
        Ok(outcome) => return Ok(outcome),
        Err(e) if e.kind() == io::ErrorKind::NotFound => info!("exec cached: {e}"),
        Err(e) => warn!("exec cached: {e}"),
    }

    let tmp = tempfile::Builder::new()
        .prefix("xrun")
        .suffix(&temp_suffix(address.basename()))
        .tempfile_in(address.dir())
        .map_err(RunError::io("set up tempfile"))?;
    let mut dest = tokio::fs::File::from_std(tmp.reopen().map_err(RunError::io("open tempfile"))?);

    let fetcher = Fetcher::new(config.http_timeout)?;
    let downloaded = fetcher
        .download_to(url.as_str(), &mut dest, hash.as_ref().map(HashSpec::algorithm))
        .await?;
    drop(dest);

    if let Some(expected) = &hash {
        downloaded.verify(expected)?;
    }

    materialize(tmp, &artifact)?;
    make_executable(&artifact.executable_path).map_err(RunError::io("make executable"))?;

    if let Err(e) = downloaded.metadata.write(&address.metadata_path()) {
        warn!("write metadata: {e}");
    }

    start(config, launcher, &artifact.executable_path, args).map_err(|source| {
        RunError::Launch {
            path: artifact.executable_path.clone(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use tempfile::TempDir;
    use xrun_schema::HashAlgorithm;
    use xrun_schema::matcher::{parse_archive_path_matcher, parse_url_matcher};

    use crate::io::extract::tests::tar_gz;

    /// Records launches of files that exist, fails like `exec` otherwise.
    #[derive(Debug, Default)]
    struct RecordingLauncher {
        calls: Mutex<Vec<(PathBuf, Vec<OsString>)>>,
        /// Error for the next launch of an existing file.
        refuse: Mutex<Option<io::ErrorKind>>,
    }

    impl RecordingLauncher {
        fn refusing_once(kind: io::ErrorKind) -> Self {
            Self {
                refuse: Mutex::new(Some(kind)),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(PathBuf, Vec<OsString>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Launcher for RecordingLauncher {
        fn launch(&self, program: &Path, args: &[OsString]) -> io::Result<()> {
            if !program.is_file() {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
            if let Some(kind) = self.refuse.lock().unwrap().take() {
                return Err(io::Error::from(kind));
            }
            self.calls
                .lock()
                .unwrap()
                .push((program.to_path_buf(), args.to_vec()));
            Ok(())
        }
    }

    fn config(cache: &TempDir, url: &str, archive_path: Option<&str>) -> RunConfig {
        RunConfig {
            urls: vec![parse_url_matcher(url).unwrap()],
            archive_paths: archive_path
                .map(|p| vec![parse_archive_path_matcher(p).unwrap()])
                .unwrap_or_default(),
            http_timeout: Duration::from_secs(10),
            dry_run: false,
            platform: Platform::new("linux/amd64"),
            cache_root: cache.path().join("v1"),
        }
    }

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(HashAlgorithm::Sha256.digest(data).unwrap())
    }

    fn host_dir(server: &mockito::Server) -> String {
        server.host_with_port().replace(':', "_")
    }

    fn leftover_temp_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .map(|rd| {
                rd.filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|n| n.starts_with("xrun") || n.starts_with(".xrun"))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_cache_miss_fetches_unpacks_and_launches() {
        let archive = tar_gz(&[("bin/tool", 0o644, b"#!/bin/sh\necho hi\n")]);
        let digest = sha256_hex(&archive);
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/x/y/tool.tar.gz")
            .with_status(200)
            .with_header("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT")
            .with_body(&archive)
            .expect(1)
            .create_async()
            .await;

        let cache = TempDir::new().unwrap();
        let url = format!("linux/amd64={}/x/y/tool.tar.gz#sha256-{digest}", server.url());
        let cfg = config(&cache, &url, Some("*/*=bin/tool"));
        let launcher = RecordingLauncher::default();
        let args = vec![OsString::from("--version")];

        let outcome = run(&cfg, &args, &launcher).await.unwrap();

        mock.assert_async().await;
        let download_dir = cache
            .path()
            .join("v1")
            .join(host_dir(&server))
            .join("x")
            .join("y")
            .join("tool.tar.gz")
            .join(format!("sha256-{digest}"));
        let exe = download_dir.join("tool.tar.gz").join("bin").join("tool");
        assert_eq!(outcome, Outcome::Launched { program: exe.clone() });
        assert_eq!(launcher.calls(), vec![(exe.clone(), args)]);
        assert!(leftover_temp_files(&download_dir).is_empty());

        let meta = crate::cache::FetchMetadata::read(&download_dir.join("tool.tar.gz-metadata.json"))
            .unwrap();
        assert_eq!(
            meta.last_modified.as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&exe).unwrap().permissions().mode();
            assert_eq!(mode & 0o100, 0o100);
        }
    }

    #[tokio::test]
    async fn test_digest_mismatch_leaves_nothing_behind() {
        let archive = tar_gz(&[("bin/tool", 0o755, b"tool")]);
        let wrong = "00".repeat(32);
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/x/y/tool.tar.gz")
            .with_status(200)
            .with_body(&archive)
            .create_async()
            .await;

        let cache = TempDir::new().unwrap();
        let url = format!("{}/x/y/tool.tar.gz#sha256-{wrong}", server.url());
        let cfg = config(&cache, &url, Some("bin/tool"));
        let launcher = RecordingLauncher::default();

        let err = run(&cfg, &[], &launcher).await.unwrap_err();

        assert!(matches!(
            err,
            RunError::Download(DownloadError::HashMismatch { .. })
        ));
        assert_eq!(err.exit_code(), EXIT_FAILURE);
        let download_dir = cache
            .path()
            .join("v1")
            .join(host_dir(&server))
            .join("x")
            .join("y")
            .join("tool.tar.gz")
            .join(format!("sha256-{wrong}"));
        assert!(!download_dir.join("tool.tar.gz").exists());
        assert!(leftover_temp_files(&download_dir).is_empty());
        assert!(launcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unlaunchable_cached_file_is_refetched() {
        let body = b"#!/bin/sh\necho fresh\n".to_vec();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/dl/shfmt")
            .with_body(&body)
            .expect(1)
            .create_async()
            .await;

        let cache = TempDir::new().unwrap();
        let cached = cache
            .path()
            .join("v1")
            .join(host_dir(&server))
            .join("dl")
            .join("shfmt")
            .join("_")
            .join("shfmt");
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, b"stale").unwrap();

        let cfg = config(&cache, &format!("{}/dl/shfmt", server.url()), None);
        let launcher = RecordingLauncher::refusing_once(io::ErrorKind::PermissionDenied);

        let outcome = run(&cfg, &[], &launcher).await.unwrap();

        mock.assert_async().await;
        assert_eq!(outcome, Outcome::Launched { program: cached.clone() });
        assert_eq!(launcher.calls().len(), 1);
        assert_eq!(fs::read(&cached).unwrap(), body);
    }

    #[tokio::test]
    async fn test_cached_archive_without_selected_path_is_refetched() {
        let archive = tar_gz(&[("bin/tool", 0o755, b"tool")]);
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/dl/tool.tar.gz")
            .with_body(&archive)
            .expect(1)
            .create_async()
            .await;

        let cache = TempDir::new().unwrap();
        let unpacked = cache
            .path()
            .join("v1")
            .join(host_dir(&server))
            .join("dl")
            .join("tool.tar.gz")
            .join("_")
            .join("tool.tar.gz");
        fs::create_dir_all(unpacked.join("other")).unwrap();
        fs::write(unpacked.join("other").join("tool"), b"wrong").unwrap();

        let cfg = config(
            &cache,
            &format!("{}/dl/tool.tar.gz", server.url()),
            Some("bin/tool"),
        );
        let launcher = RecordingLauncher::default();

        let outcome = run(&cfg, &[], &launcher).await.unwrap();

        mock.assert_async().await;
        let exe = unpacked.join("bin").join("tool");
        assert_eq!(outcome, Outcome::Launched { program: exe.clone() });
        assert_eq!(launcher.calls().len(), 1);
        assert!(!unpacked.join("other").exists());
    }

    #[tokio::test]
    async fn test_raw_download_replaces_directory_at_its_path() {
        let body = b"#!/bin/sh\n".to_vec();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/dl/tool")
            .with_body(&body)
            .expect(1)
            .create_async()
            .await;

        let cache = TempDir::new().unwrap();
        let download = cache
            .path()
            .join("v1")
            .join(host_dir(&server))
            .join("dl")
            .join("tool")
            .join("_")
            .join("tool");
        fs::create_dir_all(download.join("bin")).unwrap();
        fs::write(download.join("bin").join("tool"), b"old").unwrap();

        let cfg = config(&cache, &format!("{}/dl/tool", server.url()), None);
        let launcher = RecordingLauncher::default();

        run(&cfg, &[], &launcher).await.unwrap();

        mock.assert_async().await;
        assert!(download.is_file());
        assert_eq!(fs::read(&download).unwrap(), body);
        assert_eq!(launcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_warm_cache_skips_network() {
        let body = b"#!/bin/sh\n".to_vec();
        let digest = sha256_hex(&body);
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/dl/shfmt")
            .with_status(200)
            .with_body(&body)
            .expect(1)
            .create_async()
            .await;

        let cache = TempDir::new().unwrap();
        let url = format!("{}/dl/shfmt#sha256-{digest}", server.url());
        let cfg = config(&cache, &url, None);
        let launcher = RecordingLauncher::default();

        let first = run(&cfg, &[], &launcher).await.unwrap();
        let second = run(&cfg, &[OsString::from("-d")], &launcher).await.unwrap();

        mock.assert_async().await;
        assert_eq!(first, second);
        let calls = launcher.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1, vec![OsString::from("-d")]);
        assert!(calls[0].0.ends_with(Path::new("shfmt").join("shfmt")));
    }

    #[tokio::test]
    async fn test_dry_run_checks_instead_of_launching() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/dl/tool")
            .with_status(200)
            .with_body("bin")
            .create_async()
            .await;

        let cache = TempDir::new().unwrap();
        let mut cfg = config(&cache, &format!("{}/dl/tool", server.url()), None);
        cfg.dry_run = true;
        let launcher = RecordingLauncher::default();

        let outcome = run(&cfg, &[], &launcher).await.unwrap();

        let Outcome::DryRun { program } = outcome else {
            panic!("expected dry run, got {outcome:?}");
        };
        assert!(program.ends_with(Path::new("_").join("tool")));
        assert!(program.is_file());
        assert!(launcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_http_error_is_operational() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let cache = TempDir::new().unwrap();
        let cfg = config(&cache, &format!("{}/missing", server.url()), None);
        let err = run(&cfg, &[], &RecordingLauncher::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::Download(DownloadError::Status { .. })
        ));
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }

    #[tokio::test]
    async fn test_unmatched_platform_and_bad_fragment() {
        let cache = TempDir::new().unwrap();
        let mut cfg = config(&cache, "linux/*=https://example.invalid/tool", None);
        cfg.platform = Platform::new("plan9/arm");
        let err = run(&cfg, &[], &RecordingLauncher::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::NoUrl(_)));
        assert_eq!(err.exit_code(), EXIT_FAILURE);

        let cfg = config(&cache, "https://example.invalid/tool#sha256-zz", None);
        let err = run(&cfg, &[], &RecordingLauncher::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Hash(_)));
        assert_eq!(err.exit_code(), EXIT_USAGE);
    }

    #[test]
    fn test_temp_suffix() {
        assert_eq!(temp_suffix("Tool.TAR.GZ"), "-tool.tar.gz");
        assert_eq!(temp_suffix("black-24.3.0-py3-none-any.whl"), "-black-24.3.0-py3-none-any.zip");
    }
}
