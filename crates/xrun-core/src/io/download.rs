//! HTTP fetching with streaming digest computation.

use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use xrun_schema::{HashAlgorithm, HashError, HashSpec};

use crate::cache::FetchMetadata;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GET {url}: HTTP status {status}")]
    Status { url: String, status: StatusCode },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Hash(#[from] HashError),

    #[error("{algorithm} digest mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },
}

/// Result of streaming a response body to disk.
#[derive(Debug, Clone)]
pub struct Downloaded {
    /// Body length.
    pub bytes: u64,
    /// Digest over the body, when one was requested.
    pub digest: Option<(HashAlgorithm, Vec<u8>)>,
    /// Response validators.
    pub metadata: FetchMetadata,
}

impl Downloaded {
    /// Compare the computed digest against `expected`.
    pub fn verify(&self, expected: &HashSpec) -> Result<(), DownloadError> {
        let actual = match &self.digest {
            Some((alg, digest)) if *alg == expected.algorithm() => digest.clone(),
            _ => Vec::new(),
        };
        if !expected.matches(&actual) {
            return Err(DownloadError::HashMismatch {
                algorithm: expected.algorithm(),
                expected: hex::encode(expected.digest()),
                actual: hex::encode(actual),
            });
        }
        info!("{} digest match: {}", expected.algorithm(), hex::encode(&actual));
        Ok(())
    }
}

/// Shared HTTP client. Every request carries the `xrun` user agent.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Build a client. A zero `timeout` disables the limit.
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let mut builder = Client::builder().user_agent(crate::USER_AGENT);
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// GET `url`; anything but `200 OK` is an error.
    pub async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response, DownloadError> {
        info!("GET {url}");
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        Ok(response)
    }

    /// GET and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T, DownloadError> {
        Ok(self.get(url, headers).await?.json().await?)
    }

    /// GET a text body.
    pub async fn get_text(&self, url: &str) -> Result<String, DownloadError> {
        Ok(self.get(url, &[]).await?.text().await?)
    }

    /// Stream `url` into `dest`, hashing with `algorithm` on the way.
    pub async fn download_to(
        &self,
        url: &str,
        dest: &mut File,
        algorithm: Option<HashAlgorithm>,
    ) -> Result<Downloaded, DownloadError> {
        let mut hasher = algorithm.map(HashAlgorithm::hasher).transpose()?;
        let response = self.get(url, &[]).await?;
        let metadata = FetchMetadata::from_headers(response.headers());

        let mut stream = response.bytes_stream();
        let mut bytes: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            dest.write_all(&chunk).await?;
            if let Some(h) = hasher.as_mut() {
                h.update(&chunk);
            }
            bytes += chunk.len() as u64;
        }
        dest.flush().await?;

        let digest = algorithm.zip(hasher.map(|h| h.finalize().into_vec()));
        match &digest {
            Some((_, d)) => info!("downloaded {bytes} bytes, digest {}", hex::encode(d)),
            None => info!("downloaded {bytes} bytes"),
        }
        debug!(?metadata, "response validators");
        Ok(Downloaded {
            bytes,
            digest,
            metadata,
        })
    }
}
