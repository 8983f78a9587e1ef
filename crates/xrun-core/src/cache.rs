//! Content addressed cache layout.
//!
//! A download lives at
//! `<root>/<host>/<url path segments>/<digest>/<basename>`, where `<digest>`
//! is `algorithm-hex` or [`NO_DIGEST_PLACEHOLDER`]. A query string is folded,
//! escaped, into the last path segment so it takes part in the address.

use std::io;
use std::path::{Path, PathBuf};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use xrun_schema::{HashSpec, NO_DIGEST_PLACEHOLDER};

/// Bytes escaped when folding a query into a path segment. Unreserved
/// characters and the sub-delimiters allowed in segments pass through.
pub(crate) const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

/// URL that cannot be mapped into the cache.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    /// Path ends in `/`, leaving nothing to name the download.
    #[error("URL {0} has no file name")]
    NoFileName(String),

    /// Decoded path segment would escape its directory.
    #[error("URL {url} has unusable path segment {segment:?}")]
    UnsafeSegment {
        /// Offending URL.
        url: String,
        /// Decoded segment.
        segment: String,
    },
}

/// Where a URL and expected digest are cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheAddress {
    dir: PathBuf,
    basename: String,
}

impl CacheAddress {
    /// Compute the address of `url` under `root`.
    ///
    /// # Errors
    ///
    /// See [`CacheError`].
    pub fn new(root: &Path, url: &Url, hash: Option<&HashSpec>) -> Result<Self, CacheError> {
        let mut segments: Vec<String> = Vec::new();

        let mut host = url.host_str().unwrap_or_default().to_string();
        if let Some(port) = url.port() {
            host.push_str(&format!(":{port}"));
        }
        segments.push(host.replace(':', "_"));

        for raw in url.path().split('/') {
            let segment = percent_decode_str(raw).decode_utf8_lossy();
            for part in segment.split('/').filter(|p| !p.is_empty()) {
                if part == "." || part == ".." {
                    return Err(CacheError::UnsafeSegment {
                        url: url.to_string(),
                        segment: part.to_string(),
                    });
                }
                segments.push(part.to_string());
            }
        }

        let basename = segments
            .last()
            .filter(|_| segments.len() > 1 && !url.path().ends_with('/'))
            .cloned()
            .ok_or_else(|| CacheError::NoFileName(url.to_string()))?;

        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            let escaped = utf8_percent_encode(&format!("?{query}"), SEGMENT).to_string();
            if let Some(last) = segments.last_mut() {
                last.push_str(&escaped);
            }
        }

        segments.push(hash.map_or_else(|| NO_DIGEST_PLACEHOLDER.to_string(), ToString::to_string));

        let mut dir = root.to_path_buf();
        dir.extend(segments.iter().filter(|s| !s.is_empty()));
        Ok(Self { dir, basename })
    }

    /// Directory holding the download and its sidecar.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name of the download, the last URL path segment.
    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// Raw download, or the directory an archive was unpacked into.
    pub fn download_path(&self) -> PathBuf {
        self.dir.join(&self.basename)
    }

    /// Fetch metadata sidecar next to the download.
    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(format!("{}-metadata.json", self.basename))
    }

    /// Resolve the executable for an optional in-archive path.
    pub fn artifact(&self, archive_path: Option<&str>) -> CachedArtifact {
        let download_path = self.download_path();
        let mut executable_path = download_path.clone();
        if let Some(rel) = archive_path {
            executable_path.extend(rel.split('/').filter(|s| !s.is_empty()));
        }
        CachedArtifact {
            download_path,
            executable_path,
        }
    }
}

/// Download and executable locations for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    /// Raw binary or unpacked archive directory.
    pub download_path: PathBuf,
    /// What gets launched.
    pub executable_path: PathBuf,
}

impl CachedArtifact {
    /// Whether the download is unpacked into a directory.
    pub fn is_archive(&self) -> bool {
        self.download_path != self.executable_path
    }
}

/// Response validators persisted with a download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchMetadata {
    /// `ETag` response header.
    #[serde(rename = "ETag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// `Last-Modified` response header.
    #[serde(
        rename = "Last-Modified",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<String>,
}

impl FetchMetadata {
    /// Capture validators from response headers.
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        let get = |name: reqwest::header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            etag: get(reqwest::header::ETAG),
            last_modified: get(reqwest::header::LAST_MODIFIED),
        }
    }

    /// Write as JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns the encoding or filesystem error.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let data = serde_json::to_vec(self)?;
        std::fs::write(path, data)
    }

    /// Read back a sidecar written by [`FetchMetadata::write`].
    ///
    /// # Errors
    ///
    /// Returns the filesystem or decoding error.
    pub fn read(path: &Path) -> io::Result<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}
