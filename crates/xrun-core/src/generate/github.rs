//! GitHub Releases provider.

use percent_encoding::utf8_percent_encode;
use tracing::info;
use xrun_schema::release::{ASSET_STATE_UPLOADED, Release, preferred_release};
use xrun_schema::Override;

use super::{Collector, GenerateError, Generated, Generator, tool_exe};
use crate::cache::SEGMENT;

const API_VERSION: (&str, &str) = ("X-GitHub-Api-Version", "2022-11-28");
const ACCEPT: (&str, &str) = ("Accept", "application/vnd.github+json");

/// Releases come paginated; 100 per page is the API maximum.
const PER_PAGE: u32 = 100;

fn escape(s: &str) -> String {
    utf8_percent_encode(s, SEGMENT).to_string()
}

impl Generator {
    /// First page of a repository's releases, newest first.
    pub async fn github_releases(
        &self,
        owner: &str,
        project: &str,
    ) -> Result<Vec<Release>, GenerateError> {
        let url = format!(
            "{}/repos/{}/{}/releases?per_page={PER_PAGE}",
            self.endpoints.github_api,
            escape(owner),
            escape(project),
        );
        self.fetcher
            .get_json(&url, &[API_VERSION, ACCEPT])
            .await
            .map_err(|source| GenerateError::Fetch {
                what: format!("{owner}/{project} releases"),
                source,
            })
    }

    /// The release tagged `tag`.
    pub async fn github_release(
        &self,
        owner: &str,
        project: &str,
        tag: &str,
    ) -> Result<Release, GenerateError> {
        let url = format!(
            "{}/repos/{}/{}/releases/tags/{}",
            self.endpoints.github_api,
            escape(owner),
            escape(project),
            escape(tag),
        );
        self.fetcher
            .get_json(&url, &[API_VERSION, ACCEPT])
            .await
            .map_err(|source| GenerateError::Fetch {
                what: format!("{owner}/{project} release {tag}"),
                source,
            })
    }

    /// The release to use when none was asked for.
    pub async fn preferred_github_release(
        &self,
        owner: &str,
        project: &str,
    ) -> Result<Release, GenerateError> {
        let releases = self.github_releases(owner, project).await?;
        preferred_release(&releases)
            .cloned()
            .ok_or_else(|| GenerateError::NoRelease(format!("{owner}/{project}")))
    }

    /// Matcher arguments for `tool` in a GitHub release.
    ///
    /// With no `release` the preferred one is picked. `overrides` take
    /// precedence over the file name heuristics.
    pub async fn generate_github(
        &self,
        owner: &str,
        project: &str,
        tool: &str,
        release: Option<&str>,
        overrides: &[Override],
    ) -> Result<Generated, GenerateError> {
        let release = match release {
            Some(tag) => self.github_release(owner, project, tag).await?,
            None => self.preferred_github_release(owner, project).await?,
        };
        info!("release: {}", release.tag_name);

        let categorized = release.categorize_assets(overrides);
        for asset in &categorized.others {
            info!("no matching pattern for {}, ignoring", asset.browser_download_url);
        }
        let sums_urls: Vec<&str> = categorized
            .checksums
            .iter()
            .map(|a| a.browser_download_url.as_str())
            .collect();
        let checksums = self.checksums(&sums_urls).await?;

        let mut collector = Collector::default();
        for (platform, asset) in &categorized.by_platform {
            if asset.state != ASSET_STATE_UPLOADED {
                return Err(GenerateError::AssetState {
                    url: asset.browser_download_url.clone(),
                    state: asset.state.clone(),
                    expected: ASSET_STATE_UPLOADED,
                });
            }
            let url = &asset.browser_download_url;
            let (digest, exe_path) = self
                .process_checked_asset(url, &tool_exe(platform, tool), &checksums)
                .await?;
            collector.push(platform, url, &digest, exe_path);
        }
        Ok(collector.finish())
    }
}
