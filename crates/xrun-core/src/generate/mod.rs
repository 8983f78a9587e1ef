//! Derive `--url` / `--archive-exe-path` arguments from published releases.
//!
//! Each provider lists candidate assets, [`xrun_schema::categorize`] sorts
//! them into platform buckets, and every bucket's asset is downloaded once
//! to compute its digest and locate the tool inside it.

pub mod github;
pub mod presets;
pub mod pypi;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};
use xrun_schema::{Checksums, HashAlgorithm, HashError, VersionError};

use crate::io::download::{DownloadError, Fetcher};
use crate::io::extract::{self, ExtractError};
use crate::paths::filename_from_url;
use crate::pipeline::temp_suffix;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("{0}")]
    Download(#[from] DownloadError),

    #[error("set up tempfile: {0}")]
    Io(#[from] std::io::Error),

    #[error("get {what}: {source}")]
    Fetch {
        what: String,
        #[source]
        source: DownloadError,
    },

    #[error("{0}")]
    Hash(#[from] HashError),

    #[error("{0}")]
    Version(#[from] VersionError),

    #[error("no releases found for {0}")]
    NoRelease(String),

    #[error("asset with download URL {url} state {state:?}, expected {expected:?}")]
    AssetState {
        url: String,
        state: String,
        expected: &'static str,
    },

    #[error("no digest match for {0}")]
    ChecksumMismatch(String),
}

/// Base URLs of the metadata providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub github_api: String,
    pub pypi: String,
    pub hashicorp_releases: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            github_api: "https://api.github.com".to_string(),
            pypi: "https://pypi.org".to_string(),
            hashicorp_releases: "https://releases.hashicorp.com".to_string(),
        }
    }
}

/// Generated matcher arguments, ready to print.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generated {
    /// `platform=url#sha256-hex` values, one per bucket.
    pub urls: Vec<String>,
    /// Archive path matcher values.
    pub exe_paths: Vec<String>,
}

impl fmt::Display for Generated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for url in &self.urls {
            writeln!(f, "--url {url}")?;
        }
        for path in &self.exe_paths {
            writeln!(f, "--archive-exe-path {path}")?;
        }
        Ok(())
    }
}

/// Accumulates per-bucket results into [`Generated`].
#[derive(Debug, Default)]
struct Collector {
    urls: Vec<String>,
    exe_paths: BTreeMap<String, String>,
}

impl Collector {
    fn push(&mut self, platform: &str, url: &str, digest: &[u8], exe_path: Option<String>) {
        self.urls
            .push(format!("{platform}={url}#sha256-{}", hex::encode(digest)));
        if let Some(path) = exe_path {
            self.exe_paths.insert(platform.to_string(), path);
        }
    }

    fn finish(self) -> Generated {
        Generated {
            urls: self.urls,
            exe_paths: exe_path_args(&self.exe_paths),
        }
    }
}

/// Archive path matcher values for the found tool paths.
///
/// When every platform has the same path (a trailing `.exe` on windows
/// buckets aside) a single unqualified value is returned; the matcher adds
/// `.exe` back on windows.
pub fn exe_path_args(paths: &BTreeMap<String, String>) -> Vec<String> {
    let stripped: Vec<&str> = paths
        .iter()
        .map(|(platform, path)| {
            let is_exe = path.to_lowercase().ends_with(".exe");
            if platform.starts_with("windows/") && is_exe {
                &path[..path.len() - ".exe".len()]
            } else {
                path.as_str()
            }
        })
        .collect();

    if let Some(first) = stripped.first()
        && stripped.iter().all(|p| p == first)
    {
        return vec![(*first).to_string()];
    }

    let mut args: Vec<String> = paths
        .iter()
        .map(|(platform, path)| format!("{platform}={path}"))
        .collect();
    args.sort();
    args
}

/// Tool file name to look for in a bucket's archive.
fn tool_exe(platform: &str, tool: &str) -> String {
    if platform.starts_with("windows/") {
        format!("{tool}.exe")
    } else {
        tool.to_string()
    }
}

/// Provider client shared by the generate workflows.
#[derive(Debug, Clone)]
pub struct Generator {
    fetcher: Fetcher,
    endpoints: Endpoints,
}

impl Generator {
    pub fn new(timeout: Duration, endpoints: Endpoints) -> Result<Self, GenerateError> {
        Ok(Self {
            fetcher: Fetcher::new(timeout)?,
            endpoints,
        })
    }

    /// Fetch and merge checksum manifests. Unparseable ones are skipped.
    async fn checksums(&self, urls: &[&str]) -> Result<Checksums, GenerateError> {
        let mut checksums = Checksums::default();
        for url in urls {
            let text = self.fetcher.get_text(url).await?;
            if let Err(e) = checksums.parse_into(&text) {
                warn!("unmarshal checksums from {url}: {e}");
            }
        }
        Ok(checksums)
    }

    /// Download `url` to a scratch file, returning its SHA-256 digest and
    /// the location of `tool_exe` inside it, if it is an archive holding one.
    async fn process_asset(
        &self,
        url: &str,
        tool_exe: &str,
    ) -> Result<(Vec<u8>, Option<String>), GenerateError> {
        let tmp = tempfile::Builder::new()
            .prefix("xrun")
            .suffix(&temp_suffix(filename_from_url(url)))
            .tempfile()?;
        let mut dest = tokio::fs::File::from_std(tmp.reopen()?);
        let downloaded = self
            .fetcher
            .download_to(url, &mut dest, Some(HashAlgorithm::Sha256))
            .await?;
        drop(dest);
        let digest = downloaded.digest.map(|(_, d)| d).unwrap_or_default();

        let exe_path = match extract::find_tool(tmp.path(), tool_exe) {
            Ok(path) => path,
            Err(ExtractError::UnsupportedFormat(_)) => None,
            Err(e) => {
                error!("find tool in archive: {e}");
                None
            }
        };
        Ok((digest, exe_path))
    }

    /// [`Self::process_asset`] plus verification against upstream checksums.
    ///
    /// Entries of a different digest length are not candidates. Having no
    /// candidate at all is only worth a warning.
    async fn process_checked_asset(
        &self,
        url: &str,
        tool_exe: &str,
        checksums: &Checksums,
    ) -> Result<(Vec<u8>, Option<String>), GenerateError> {
        let (digest, exe_path) = self.process_asset(url, tool_exe).await?;
        if checksums.entries.is_empty() {
            return Ok((digest, exe_path));
        }

        let mut candidates = checksums
            .get(filename_from_url(url))
            .filter(|e| e.digest.len() == digest.len())
            .peekable();
        if candidates.peek().is_none() {
            warn!("no upstream digest for {url}");
            return Ok((digest, exe_path));
        }
        if candidates.any(|e| e.digest == digest) {
            info!("digest match for {url}: {}", hex::encode(&digest));
            return Ok((digest, exe_path));
        }
        Err(GenerateError::ChecksumMismatch(url.to_string()))
    }
}
