//! Tools whose releases need more than the generic providers give.

use std::collections::BTreeMap;

use percent_encoding::utf8_percent_encode;
use tracing::{info, warn};
use xrun_schema::{Checksums, Override, categorize};

use super::{Collector, GenerateError, Generated, Generator, tool_exe};
use crate::cache::SEGMENT;

const TERRAFORM_OWNER: &str = "hashicorp";
const TERRAFORM_PROJECT: &str = "terraform";

/// Black publishes bare executables named only by OS.
pub fn black_overrides() -> Vec<Override> {
    [
        ("darwin/amd64", r"_macos$"),
        ("linux/amd64", r"_linux$"),
        ("windows/amd64", r"_windows\.exe$"),
    ]
    .into_iter()
    .map(|(platform, pattern)| {
        Override::new(platform, pattern).expect("black override pattern compiles")
    })
    .collect()
}

impl Generator {
    /// Matcher arguments for black, from its GitHub releases.
    pub async fn generate_black(&self, release: Option<&str>) -> Result<Generated, GenerateError> {
        self.generate_github("psf", "black", "black", release, &black_overrides())
            .await
    }

    /// Matcher arguments for terraform, from releases.hashicorp.com.
    ///
    /// Assets are taken from the release's SHA256SUMS file rather than a
    /// listing. With no `release` the version follows the GitHub releases.
    pub async fn generate_terraform(
        &self,
        release: Option<&str>,
    ) -> Result<Generated, GenerateError> {
        let tag = match release {
            Some(r) => r.to_string(),
            None => {
                self.preferred_github_release(TERRAFORM_OWNER, TERRAFORM_PROJECT)
                    .await?
                    .tag_name
            }
        };
        let version = tag.strip_prefix('v').unwrap_or(&tag);
        let version = utf8_percent_encode(version, SEGMENT).to_string();
        info!("version: {version}");

        let base = format!(
            "{}/{TERRAFORM_PROJECT}/{version}",
            self.endpoints.hashicorp_releases
        );
        let sums_url = format!("{base}/{TERRAFORM_PROJECT}_{version}_SHA256SUMS");
        let text = self.fetcher.get_text(&sums_url).await?;
        let mut checksums = Checksums::default();
        if let Err(e) = checksums.parse_into(&text) {
            warn!("unmarshal checksums from {sums_url}: {e}");
        }

        let names: BTreeMap<String, String> = checksums
            .entries
            .iter()
            .map(|e| (e.filename.clone(), e.filename.clone()))
            .collect();
        let categorized = categorize(names, &[]);
        for name in &categorized.others {
            info!("no matching pattern for {name}, ignoring");
        }

        let mut collector = Collector::default();
        for (platform, name) in &categorized.by_platform {
            let url = format!("{base}/{}", utf8_percent_encode(name, SEGMENT));
            let (digest, exe_path) = self
                .process_checked_asset(&url, &tool_exe(platform, TERRAFORM_PROJECT), &checksums)
                .await?;
            collector.push(platform, &url, &digest, exe_path);
        }
        Ok(collector.finish())
    }
}
