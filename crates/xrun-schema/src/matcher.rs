//! Ordered `[platform-glob=]value` matchers.
//!
//! A matcher list is consulted in order against the runtime platform string
//! and the first glob that matches wins. Globs use shell semantics where `/`
//! is a literal separator, so `*` never spans the os/arch boundary.

use std::fmt;

use glob::{MatchOptions, Pattern, PatternError};
use thiserror::Error;
use url::Url;

use crate::platform::Platform;

/// Pattern assigned to matcher arguments given without one.
pub const CATCH_ALL: &str = "*/*";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Failure to parse a matcher argument.
#[derive(Error, Debug)]
pub enum MatcherError {
    /// The platform glob does not compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: PatternError,
    },

    /// The right-hand side is not an absolute URL.
    #[error("invalid URL {url:?}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// `pattern=` with nothing after the `=`.
    #[error("missing path in {0:?}")]
    MissingPath(String),

    /// Absolute or parent-escaping archive path.
    #[error("archive path {0:?} must be relative and stay within the archive")]
    UnsafePath(String),
}

/// One `(glob, value)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformMatch<T> {
    pattern: Pattern,
    value: T,
}

impl<T> PlatformMatch<T> {
    /// Compile `pattern` and pair it with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::Pattern`] for malformed globs.
    pub fn new(pattern: &str, value: T) -> Result<Self, MatcherError> {
        let pattern = Pattern::new(pattern).map_err(|source| MatcherError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { pattern, value })
    }

    /// The glob as written.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// The value selected when the glob matches.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Whether this matcher applies to `platform`.
    pub fn matches(&self, platform: &Platform) -> bool {
        self.pattern.matches_with(platform.as_str(), MATCH_OPTIONS)
    }
}

impl<T: fmt::Display> fmt::Display for PlatformMatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.pattern, self.value)
    }
}

/// Parse a `[platform-glob=]URL` argument.
///
/// A left-hand side containing `://` means the `=` belonged to the URL
/// itself (typically its query string), so the whole argument is the URL.
///
/// # Errors
///
/// Returns an error for malformed globs or URLs.
pub fn parse_url_matcher(arg: &str) -> Result<PlatformMatch<Url>, MatcherError> {
    let (pattern, raw_url) = match arg.split_once('=') {
        Some((pattern, _)) if pattern.contains("://") => (CATCH_ALL, arg),
        Some(("", raw_url)) => (CATCH_ALL, raw_url),
        Some((pattern, raw_url)) => (pattern, raw_url),
        None => (CATCH_ALL, arg),
    };
    let url = Url::parse(raw_url).map_err(|source| MatcherError::Url {
        url: raw_url.to_string(),
        source,
    })?;
    PlatformMatch::new(pattern, url)
}

/// Parse a `[platform-glob=]path` archive executable argument.
///
/// Paths always use `/` as separator regardless of the host platform.
///
/// # Errors
///
/// Returns an error for malformed globs, empty paths, and paths that are
/// absolute or climb out of the archive root.
pub fn parse_archive_path_matcher(arg: &str) -> Result<PlatformMatch<String>, MatcherError> {
    let (pattern, path) = match arg.split_once('=') {
        Some((_, "")) => return Err(MatcherError::MissingPath(arg.to_string())),
        Some(("", path)) => (CATCH_ALL, path),
        Some((pattern, path)) => (pattern, path),
        None => (CATCH_ALL, arg),
    };
    if path.starts_with('/') || path.split('/').any(|seg| seg == "..") {
        return Err(MatcherError::UnsafePath(path.to_string()));
    }
    PlatformMatch::new(pattern, path.to_string())
}

/// Value of the first matcher applying to `platform`, if any.
pub fn select<'a, T>(platform: &Platform, matches: &'a [PlatformMatch<T>]) -> Option<&'a T> {
    matches
        .iter()
        .find(|m| m.matches(platform))
        .map(PlatformMatch::value)
}

/// Archive executable path for `platform`.
///
/// On windows, `.exe` is appended to paths without an extension that were
/// selected through a wildcard OS segment (`*/...`), so a single
/// `*/*=bin/tool` works everywhere.
pub fn select_archive_path(
    platform: &Platform,
    matches: &[PlatformMatch<String>],
) -> Option<String> {
    let m = matches.iter().find(|m| m.matches(platform))?;
    let mut path = m.value.clone();
    let last = path.rsplit('/').next().unwrap_or_default();
    let has_ext = last.rfind('.').is_some();
    if platform.is_windows() && m.pattern().starts_with("*/") && !has_ext {
        path.push_str(".exe");
    }
    Some(path)
}
