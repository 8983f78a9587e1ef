//! PyPI simple index (JSON flavour) and wheel/sdist file names.
//!
//! Only what is needed to pick platform specific wheels of one release is
//! modelled here; the HTTP side lives in `xrun-core`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::categorize::Categorized;
use crate::pep440::{Version, VersionError};

static WHEEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<distribution>[^-]+)",
        r"-(?P<version>[^-]+)",
        r"(?:-(?P<build_tag>[0-9][^-]*))?",
        r"-(?P<python_tags>[^.-]+(?:\.[^.-]+)*)",
        r"-(?P<abi_tags>[^.-]+(?:\.[^.-]+)*)",
        r"-(?P<platform_tags>[^.-]+(?:\.[^.-]+)*)",
        r"\.whl$",
    ))
    .expect("wheel pattern compiles")
});

static SDIST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<distribution>[^-]+)-(?P<version>[^-]+)\.(?:tar(?:\.(?:bz2|[gx]z|Z))?|zip)$")
        .expect("sdist pattern compiles")
});

/// Platform tag globs per bucket, best tier first.
const PLATFORM_TAG_TIERS: [&[(&str, &str)]; 3] = [
    &[
        ("darwin/amd64", "macosx_*_x86_64"),
        ("darwin/arm64", "macosx_*_arm64"),
        ("linux/386", "musllinux_*_i686"),
        ("linux/amd64", "musllinux_*_x86_64"),
        ("linux/arm", "musllinux_*_armv7l"),
        ("linux/arm64", "musllinux_*_aarch64"),
        ("windows/386", "win32"),
        ("windows/amd64", "win_amd64"),
        ("windows/arm64", "win_arm64"),
    ],
    &[
        ("darwin/amd64", "macosx_*_universal2"),
        ("darwin/arm64", "macosx_*_universal2"),
        ("linux/386", "manylinux*_i686"),
        ("linux/amd64", "manylinux*_x86_64"),
        ("linux/arm", "manylinux*_armv7l"),
        ("linux/arm64", "manylinux*_aarch64"),
        ("linux/ppc64", "manylinux*_ppc64"),
        ("linux/ppc64le", "manylinux*_ppc64le"),
        ("linux/s390x", "manylinux*_s390x"),
    ],
    &[("linux/arm", "linux_armv6l")],
];

/// File name that is neither a wheel nor an sdist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilenameError {
    /// No distribution file name grammar matched.
    #[error("unparseable filename: {0:?}")]
    Unparseable(String),

    /// Grammar matched, version did not parse.
    #[error(transparent)]
    Version(#[from] VersionError),
}

/// Parsed distribution file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameInfo {
    /// Distribution name as written.
    pub distribution: String,
    /// Distribution version.
    pub version: Version,
    /// Optional wheel build tag.
    pub build_tag: Option<String>,
    /// Wheel python tags.
    pub python_tags: Vec<String>,
    /// Wheel ABI tags.
    pub abi_tags: Vec<String>,
    /// Wheel platform tags, e.g. `manylinux_2_17_x86_64`.
    pub platform_tags: Vec<String>,
    /// True for wheels.
    pub is_binary_distribution: bool,
}

impl FilenameInfo {
    /// Parse a wheel or sdist file name.
    ///
    /// # Errors
    ///
    /// See [`FilenameError`].
    pub fn parse(filename: &str) -> Result<Self, FilenameError> {
        let tags = |caps: &regex::Captures<'_>, name: &str| -> Vec<String> {
            caps.name(name)
                .map(|m| m.as_str().split('.').map(str::to_string).collect())
                .unwrap_or_default()
        };

        if let Some(caps) = WHEEL_PATTERN.captures(filename) {
            return Ok(Self {
                distribution: caps["distribution"].to_string(),
                version: caps["version"].parse()?,
                build_tag: caps.name("build_tag").map(|m| m.as_str().to_string()),
                python_tags: tags(&caps, "python_tags"),
                abi_tags: tags(&caps, "abi_tags"),
                platform_tags: tags(&caps, "platform_tags"),
                is_binary_distribution: true,
            });
        }
        if let Some(caps) = SDIST_PATTERN.captures(filename) {
            return Ok(Self {
                distribution: caps["distribution"].to_string(),
                version: caps["version"].parse()?,
                build_tag: None,
                python_tags: Vec::new(),
                abi_tags: Vec::new(),
                platform_tags: Vec::new(),
                is_binary_distribution: false,
            });
        }
        Err(FilenameError::Unparseable(filename.to_string()))
    }
}

/// `hashes` object of a file entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimpleFileHashes {
    /// Hex SHA-256, when the index provides one.
    #[serde(default)]
    pub sha256: Option<String>,
}

/// One file of a project.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimpleFile {
    /// Distribution file name.
    pub filename: String,
    /// Download URL.
    #[serde(default)]
    pub url: String,
    /// Digests published by the index.
    #[serde(default)]
    pub hashes: SimpleFileHashes,
    /// Yank reason, `None` when not yanked.
    #[serde(default, deserialize_with = "deserialize_yanked")]
    pub yanked: Option<String>,
}

impl SimpleFile {
    /// Parsed file name, if it follows a distribution grammar.
    pub fn info(&self) -> Option<FilenameInfo> {
        FilenameInfo::parse(&self.filename).ok()
    }

    /// Whether the file has been yanked.
    pub fn is_yanked(&self) -> bool {
        self.yanked.is_some()
    }
}

fn deserialize_yanked<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Reason(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None | Some(Raw::Flag(false)) => None,
        Some(Raw::Flag(true)) => Some("no yanked reason".to_string()),
        Some(Raw::Reason(reason)) if reason.is_empty() => None,
        Some(Raw::Reason(reason)) => Some(reason),
    })
}

/// A project page of the JSON simple API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimpleProject {
    /// Normalized project name.
    pub name: String,
    /// All files of all releases.
    #[serde(default)]
    pub files: Vec<SimpleFile>,
}

impl SimpleProject {
    /// Distinct versions having at least one non-yanked file, newest first.
    /// Files with unparseable names are ignored.
    pub fn valid_versions(&self) -> Vec<Version> {
        let mut by_name: BTreeMap<String, Version> = BTreeMap::new();
        for file in self.files.iter().filter(|f| !f.is_yanked()) {
            if let Some(info) = file.info() {
                by_name.entry(info.version.to_string()).or_insert(info.version);
            }
        }
        let mut versions: Vec<Version> = by_name.into_values().collect();
        versions.sort_by(|a, b| b.cmp(a));
        versions
    }

    /// Newest final release, or the newest version if all are pre-releases.
    pub fn preferred_version(&self) -> Option<Version> {
        let versions = self.valid_versions();
        let stable = versions.iter().position(|v| !v.is_prerelease());
        versions.into_iter().nth(stable.unwrap_or(0))
    }

    /// Preferred wheel per `os/arch` for `version`.
    ///
    /// Only non-yanked wheels of `version` are considered. Tag tiers are
    /// tried in order over all candidate files, so a better tier always
    /// wins over an earlier listed file of a worse one. A wheel may fill
    /// several buckets (`universal2`); wheels matching no tag end up in
    /// `others`.
    pub fn preferred_os_arch_files(&self, version: &Version) -> Categorized<SimpleFile> {
        let wanted = version.to_string();
        let candidates: Vec<(&SimpleFile, Vec<String>)> = self
            .files
            .iter()
            .filter(|f| !f.is_yanked())
            .filter_map(|f| {
                let info = f.info()?;
                (info.is_binary_distribution && info.version.to_string() == wanted)
                    .then_some((f, info.platform_tags))
            })
            .collect();

        let mut out = Categorized::default();
        let mut matched = vec![false; candidates.len()];
        for tier in PLATFORM_TAG_TIERS {
            for &(platform, glob) in tier {
                let Ok(pattern) = Pattern::new(glob) else {
                    continue;
                };
                for (i, (file, tags)) in candidates.iter().enumerate() {
                    if tags.iter().any(|t| pattern.matches(t)) {
                        out.by_platform
                            .entry(platform.to_string())
                            .or_insert_with(|| (*file).clone());
                        matched[i] = true;
                    }
                }
            }
        }
        out.others = candidates
            .iter()
            .zip(matched)
            .filter(|(_, m)| !m)
            .map(|((file, _), _)| (*file).clone())
            .collect();
        out
    }
}
