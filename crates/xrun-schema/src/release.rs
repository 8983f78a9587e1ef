//! GitHub Releases API payloads.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::categorize::{Categorized, Override, categorize};

/// Asset state of a fully uploaded file.
pub const ASSET_STATE_UPLOADED: &str = "uploaded";

/// One release asset. Classification and checksum lookups both key on the
/// download URL rather than the display name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    /// Public download URL.
    pub browser_download_url: String,
    /// `uploaded` or `open`.
    #[serde(default)]
    pub state: String,
}

impl ReleaseAsset {
    /// Last path segment of the download URL.
    pub fn file_name(&self) -> &str {
        self.browser_download_url
            .rsplit('/')
            .next()
            .unwrap_or(&self.browser_download_url)
    }
}

/// A release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    /// Git tag.
    pub tag_name: String,
    /// Unpublished draft.
    #[serde(default)]
    pub draft: bool,
    /// Marked as pre-release.
    #[serde(default)]
    pub prerelease: bool,
    /// Attached files.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Classify assets by their download URLs.
    pub fn categorize_assets(&self, overrides: &[Override]) -> Categorized<ReleaseAsset> {
        let by_url: BTreeMap<String, ReleaseAsset> = self
            .assets
            .iter()
            .map(|a| (a.browser_download_url.clone(), a.clone()))
            .collect();
        categorize(by_url, overrides)
    }
}

/// Pick the release to generate for: the first published final release,
/// else the first published pre-release, else the first one listed.
pub fn preferred_release(releases: &[Release]) -> Option<&Release> {
    let published = || releases.iter().filter(|r| !r.draft);
    published()
        .find(|r| !r.prerelease)
        .or_else(|| published().next())
        .or_else(|| releases.first())
}
