//! Release asset classification by file name.
//!
//! Assets are sorted into at most one preferred asset per `os/arch`,
//! checksum manifests, and everything else. Classification runs in
//! priority order:
//!
//! 1. caller supplied overrides,
//! 2. `os` and `arch` token templates, best tiers first,
//! 3. a checksum manifest heuristic for whatever is left.
//!
//! An asset whose bucket was already taken by a better match is consumed
//! and shows up in none of the outputs.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::platform::{normalize_arch, normalize_os};

/// OS token alternations, most preferred first. musl before glibc.
const OS_TIERS: [&str; 2] = [
    r"(?P<os>aix|android|(?:apple-)?darwin|dragonfly|freebsd|illumos|ios|js|linux|macos|netbsd|openbsd|pc-windows-msvc|plan9|solaris|unknown-linux-musl(?:eabihf)?|wasip1|windows)",
    r"(?P<os>unknown-linux-gnu(?:eabihf)?)",
];

/// Architecture token alternations, most preferred first. armv7 before armv6.
const ARCH_TIERS: [&str; 3] = [
    r"(?P<arch>i?[36]86|amd64|arm|arm64|loong64|mips|mips64|mips64le|mipsle|p(?:ower)?pc64(?:le)?|riscv64|s390x|wasm|x86_64)",
    r"(?P<arch>32bit|64bit|aarch64|armv7)",
    r"(?P<arch>armv6|armv6hf)",
];

/// Tarballs before zips and bare executables.
const EXT_TIERS: [&str; 2] = [r"\.tar\.[gx]z$", r"(?:\.(?:exe|zip))?$"];

static OS_ARCH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    let mut patterns = Vec::new();
    for os in OS_TIERS {
        for arch in ARCH_TIERS {
            for ext in EXT_TIERS {
                for src in [
                    format!("[_.-]{os}[_.-]{arch}{ext}"),
                    format!("[_.-]{arch}[_.-]{os}{ext}"),
                ] {
                    patterns.push(Regex::new(&src).expect("os/arch template compiles"));
                }
            }
        }
    }
    patterns
});

static CHECKSUMS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|/)[^/]*(?:sums[^/]*\.txt|[^/]\.(?:md5|sha(?:1|224|256|384|512)))$")
        .expect("checksums pattern compiles")
});

/// Force assets matching `pattern` into the `platform` bucket.
#[derive(Debug, Clone)]
pub struct Override {
    platform: String,
    pattern: Regex,
}

impl Override {
    /// Compile an override.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for a malformed `pattern`.
    pub fn new(platform: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            platform: platform.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    /// Bucket key assets are forced into.
    pub fn platform(&self) -> &str {
        &self.platform
    }
}

/// Output of [`categorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categorized<T> {
    /// Preferred asset per `os/arch`.
    pub by_platform: BTreeMap<String, T>,
    /// Checksum manifests.
    pub checksums: Vec<T>,
    /// Assets nothing recognized.
    pub others: Vec<T>,
}

impl<T> Default for Categorized<T> {
    fn default() -> Self {
        Self {
            by_platform: BTreeMap::new(),
            checksums: Vec::new(),
            others: Vec::new(),
        }
    }
}

/// Whether `name` looks like a checksum manifest.
pub fn is_checksums_file(name: &str) -> bool {
    CHECKSUMS_PATTERN.is_match(name)
}

/// Classify `assets`, keyed by file name or URL.
///
/// Overrides are applied in order; every asset an override matches is
/// consumed, the first one filling the bucket. Template matching is done on
/// the lowercased key and bucket keys are normalized through
/// [`normalize_os`] and [`normalize_arch`].
pub fn categorize<T>(mut assets: BTreeMap<String, T>, overrides: &[Override]) -> Categorized<T> {
    let mut out = Categorized::default();
    let mut work: Vec<String> = assets.keys().cloned().collect();

    for ov in overrides {
        work.retain(|name| {
            if !ov.pattern.is_match(name) {
                return true;
            }
            if let Some(asset) = assets.remove(name) {
                out.by_platform.entry(ov.platform.clone()).or_insert(asset);
            }
            false
        });
    }

    for re in OS_ARCH_PATTERNS.iter() {
        work.retain(|name| {
            let lower = name.to_lowercase();
            let Some(caps) = re.captures(&lower) else {
                return true;
            };
            let os = normalize_os(caps.name("os").map_or("", |m| m.as_str()));
            let arch = normalize_arch(caps.name("arch").map_or("", |m| m.as_str()));
            let key = format!("{os}/{arch}");
            if let Some(asset) = assets.remove(name) {
                out.by_platform.entry(key).or_insert(asset);
            }
            false
        });
    }

    for name in work {
        let Some(asset) = assets.remove(&name) else {
            continue;
        };
        if is_checksums_file(&name) {
            out.checksums.push(asset);
        } else {
            out.others.push(asset);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets(prefix: &str, pairs: &[(&str, &'static str)]) -> BTreeMap<String, &'static str> {
        pairs
            .iter()
            .map(|(name, tag)| (format!("{prefix}{name}"), *tag))
            .collect()
    }

    fn sorted(mut v: Vec<&'static str>) -> Vec<&'static str> {
        v.sort_unstable();
        v
    }

    #[test]
    fn test_categorize_basic() {
        for prefix in ["https://github.com/acme/example/releases/download/v1.0.0/", ""] {
            let input = assets(
                prefix,
                &[
                    ("checksums.txt", "checksums"),
                    ("example-1.0.0-darwin-arm64.zip", "darwin-arm64-zip"),
                    ("example-1.0.0-darwin-arm64.tar.gz", "darwin-arm64"),
                    ("example-1.0.0-linux-amd64.deb", "deb"),
                    ("example-1.0.0-linux-x86_64.tar.gz", "linux-amd64"),
                    ("example-1.0.0-linux-armv6.tar.gz", "linux-armv6-shadowed"),
                    ("example-1.0.0-linux-armv7.tar.gz", "linux-armv7"),
                    ("example-1.0.0-windows-amd64.zip", "windows-amd64"),
                    ("example-1.0.0-windows-amd64.zip.sha256", "windows-amd64-sha256"),
                    ("example-foo.zip", "override-foo"),
                    ("example.linux.loong64.tar.xz", "linux-loong64"),
                    ("example-aarch64-unknown-linux-musl.zip", "linux-arm64"),
                    ("example-aarch64-unknown-linux-gnu.zip", "linux-arm64-shadowed"),
                    ("example-other.tar.bz2", "example-other"),
                ],
            );
            let overrides = [Override::new("linux/s390x", r"-foo\.zip$").unwrap()];

            let got = categorize(input, &overrides);

            let want: BTreeMap<String, &str> = [
                ("darwin/arm64", "darwin-arm64"),
                ("linux/amd64", "linux-amd64"),
                ("linux/arm", "linux-armv7"),
                ("linux/arm64", "linux-arm64"),
                ("linux/loong64", "linux-loong64"),
                ("linux/s390x", "override-foo"),
                ("windows/amd64", "windows-amd64"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
            assert_eq!(got.by_platform, want);
            assert_eq!(sorted(got.checksums), vec!["checksums", "windows-amd64-sha256"]);
            assert_eq!(sorted(got.others), vec!["deb", "example-other"]);
        }
    }

    #[test]
    fn test_categorize_bare_executables() {
        let input = assets(
            "https://github.com/mvdan/sh/releases/download/v3.8.0/",
            &[
                ("sha256sums.txt", "checksums"),
                ("shfmt_v3.8.0_darwin_amd64", "darwin/amd64"),
                ("shfmt_v3.8.0_darwin_arm64", "darwin/arm64"),
                ("shfmt_v3.8.0_linux_386", "linux/386"),
                ("shfmt_v3.8.0_linux_amd64", "linux/amd64"),
                ("shfmt_v3.8.0_linux_arm", "linux/arm"),
                ("shfmt_v3.8.0_linux_arm64", "linux/arm64"),
                ("shfmt_v3.8.0_windows_386.exe", "windows/386"),
                ("shfmt_v3.8.0_windows_amd64.exe", "windows/amd64"),
            ],
        );
        let got = categorize(input, &[]);
        assert_eq!(got.by_platform.len(), 8);
        for (platform, tag) in &got.by_platform {
            assert_eq!(platform, tag);
        }
        assert_eq!(got.checksums, vec!["checksums"]);
        assert!(got.others.is_empty());
    }

    #[test]
    fn test_newer_arm_abi_shadows_older() {
        let input = assets(
            "",
            &[
                ("pkg_linux_armv6.tar.gz", "v6"),
                ("pkg_linux_armv7.tar.gz", "v7"),
            ],
        );
        let got = categorize(input, &[]);
        assert_eq!(got.by_platform.get("linux/arm"), Some(&"v7"));
        assert_eq!(got.by_platform.len(), 1);
        assert!(got.checksums.is_empty());
        assert!(got.others.is_empty());
    }

    #[test]
    fn test_uppercase_names_bucket_lowercase() {
        let input = assets("", &[("Tool-Darwin-X86_64.tar.gz", "mac")]);
        let got = categorize(input, &[]);
        assert_eq!(got.by_platform.get("darwin/amd64"), Some(&"mac"));
    }

    #[test]
    fn test_first_override_wins() {
        let input = assets("", &[("a-special.bin", "a"), ("b-special.bin", "b")]);
        let overrides = [
            Override::new("linux/amd64", "special").unwrap(),
            Override::new("linux/amd64", "b-").unwrap(),
        ];
        let got = categorize(input, &overrides);
        assert_eq!(got.by_platform.get("linux/amd64"), Some(&"a"));
        assert!(got.others.is_empty());
    }

    #[test]
    fn test_every_asset_lands_at_most_once_and_deterministically() {
        let pairs = [
            ("x_linux_amd64.tar.gz", "1"),
            ("x_linux_amd64.zip", "2"),
            ("x_Linux_x86_64.tar.gz", "3"),
            ("SHA256SUMS.txt", "4"),
            ("x.sha512", "5"),
            ("README.md", "6"),
        ];
        let first = categorize(assets("", &pairs), &[]);
        let second = categorize(assets("", &pairs), &[]);
        assert_eq!(first, second);

        let mut seen: Vec<&str> = first.by_platform.values().copied().collect();
        seen.extend(first.checksums.iter().copied());
        seen.extend(first.others.iter().copied());
        let mut dedup = seen.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(seen.len(), dedup.len());
        assert_eq!(sorted(first.checksums), vec!["4", "5"]);
        assert_eq!(first.others, vec!["6"]);
    }

    #[test]
    fn test_is_checksums_file() {
        assert!(is_checksums_file("checksums.txt"));
        assert!(is_checksums_file("https://x/y/SHA256SUMS.txt"));
        assert!(is_checksums_file("tool.tar.gz.sha256"));
        assert!(is_checksums_file("tool.MD5"));
        assert!(!is_checksums_file("tool.tar.gz"));
        assert!(!is_checksums_file(".sha256"));
    }
}
