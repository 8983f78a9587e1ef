//! Environment driven locations and settings.

use std::path::PathBuf;

use dirs::cache_dir;
use xrun_schema::{CACHE_VERSION, Platform};

/// Cache location override.
pub const CACHE_HOME_ENV: &str = "XRUN_CACHE_HOME";
/// Runtime `os/arch` override.
pub const OS_ARCH_ENV: &str = "XRUN_OS_ARCH";
/// Output verbosity toggle.
pub const VERBOSE_ENV: &str = "XRUN_VERBOSE";

/// Cache home, `$XRUN_CACHE_HOME` or `<user cache dir>/xrun`. `None` if
/// neither is available.
pub fn try_cache_home() -> Option<PathBuf> {
    match std::env::var_os(CACHE_HOME_ENV) {
        Some(val) if !val.is_empty() => Some(PathBuf::from(val)),
        _ => cache_dir().map(|d| d.join("xrun")),
    }
}

/// Versioned cache root that all cache addresses live under.
pub fn cache_root() -> Option<PathBuf> {
    try_cache_home().map(|h| h.join(CACHE_VERSION))
}

/// Platform to match against, `$XRUN_OS_ARCH` or the build target.
pub fn runtime_platform() -> Platform {
    match std::env::var(OS_ARCH_ENV) {
        Ok(val) if !val.is_empty() => Platform::new(val),
        _ => Platform::current(),
    }
}

/// Tri-state output verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Variable unset: warnings and errors.
    #[default]
    Default,
    /// False-like value: errors only.
    Quiet,
    /// True-like value: informational output too.
    Verbose,
}

impl Verbosity {
    /// Interpret a raw variable value. Unparseable values count as false.
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            None => Self::Default,
            Some(v) if parse_bool(v) == Some(true) => Self::Verbose,
            Some(_) => Self::Quiet,
        }
    }

    /// Read `$XRUN_VERBOSE`.
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(VERBOSE_ENV).ok().as_deref())
    }

    /// Matching `tracing` filter directive.
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Default => "warn",
            Self::Quiet => "error",
            Self::Verbose => "info",
        }
    }
}

/// Boolean spellings accepted in environment variables.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Extract the filename from a URL path.
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}
