//! PyPI provider, via the JSON flavour of the simple index.

use percent_encoding::utf8_percent_encode;
use tracing::{info, warn};
use xrun_schema::pypi::SimpleProject;
use xrun_schema::{HashAlgorithm, HashError, HashSpec, Version};

use super::{Collector, GenerateError, Generated, Generator, tool_exe};
use crate::cache::SEGMENT;
use crate::io::download::DownloadError;

const ACCEPT: (&str, &str) = ("Accept", "application/vnd.pypi.simple.v1+json");

impl Generator {
    /// The project page listing every file of every release.
    pub async fn pypi_project(&self, project: &str) -> Result<SimpleProject, GenerateError> {
        let url = format!(
            "{}/simple/{}/",
            self.endpoints.pypi,
            utf8_percent_encode(project, SEGMENT)
        );
        self.fetcher
            .get_json(&url, &[ACCEPT])
            .await
            .map_err(|source| GenerateError::Fetch {
                what: format!("{project} versions"),
                source,
            })
    }

    /// Matcher arguments for `tool` in a project's platform wheels.
    ///
    /// `release` may carry a leading `v`. Files lacking a URL or an index
    /// SHA-256 are skipped.
    pub async fn generate_pypi(
        &self,
        project: &str,
        tool: &str,
        release: Option<&str>,
    ) -> Result<Generated, GenerateError> {
        let page = self.pypi_project(project).await?;
        let version: Version = match release {
            Some(r) => r.strip_prefix('v').unwrap_or(r).parse()?,
            None => page
                .preferred_version()
                .ok_or_else(|| GenerateError::NoRelease(project.to_string()))?,
        };
        info!("version: {version}");

        let categorized = page.preferred_os_arch_files(&version);
        for file in &categorized.others {
            warn!("no matching pattern for {}, ignoring", file.filename);
        }

        let mut collector = Collector::default();
        for (platform, file) in &categorized.by_platform {
            if file.url.is_empty() {
                warn!("missing URL for {}, ignoring", file.filename);
                continue;
            }
            let Some(sha256) = file.hashes.sha256.as_deref().filter(|s| !s.is_empty()) else {
                warn!("missing SHA-256 hash for {}, ignoring", file.filename);
                continue;
            };
            let expected_digest = hex::decode(sha256).map_err(HashError::from)?;
            let expected = HashSpec::new(HashAlgorithm::Sha256, expected_digest)?;

            let (digest, exe_path) = self
                .process_asset(&file.url, &tool_exe(platform, tool))
                .await?;
            if !expected.matches(&digest) {
                return Err(DownloadError::HashMismatch {
                    algorithm: HashAlgorithm::Sha256,
                    expected: hex::encode(expected.digest()),
                    actual: hex::encode(&digest),
                }
                .into());
            }
            collector.push(platform, &file.url, &digest, exe_path);
        }
        Ok(collector.finish())
    }
}
