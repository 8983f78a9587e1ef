//! Platform strings of the form `os/arch`.
//!
//! The vocabulary follows the Go toolchain naming (`darwin`, `windows`,
//! `amd64`, `arm64`, `386`, ...) since that is what most release assets and
//! matcher arguments in the wild use. Vendor spellings found in file names
//! are folded into it with [`normalize_os`] and [`normalize_arch`].
//!
//! # Example
//!
//! ```
//! use xrun_schema::Platform;
//!
//! let p = Platform::new("linux/amd64");
//! assert_eq!(p.os(), "linux");
//! assert_eq!(p.arch(), "amd64");
//! ```

use serde::{Deserialize, Serialize};

/// A runtime platform, `os/arch`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform(String);

impl Platform {
    /// Wrap an `os/arch` string. No validation is done: overrides may be
    /// arbitrary strings, they simply won't match anything unusual.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The platform this binary was built for, in Go naming.
    pub fn current() -> Self {
        Self(format!("{}/{}", current_os(), current_arch()))
    }

    /// OS part, everything before the first `/`.
    pub fn os(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(os, _)| os)
    }

    /// Architecture part, everything after the first `/`.
    pub fn arch(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, arch)| arch)
    }

    /// Whether executables on this platform carry an `.exe` suffix.
    pub fn is_windows(&self) -> bool {
        self.os() == "windows"
    }

    /// Return the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Platform {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Go-style name of the compile target OS.
pub fn current_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Go-style name of the compile target architecture.
pub fn current_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "386",
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "loongarch64" => "loong64",
        "wasm32" => "wasm",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "powerpc64" => "ppc64",
        "mips" if cfg!(target_endian = "little") => "mipsle",
        "mips64" if cfg!(target_endian = "little") => "mips64le",
        other => other,
    }
}

/// Fold an OS token seen in a file name into the platform vocabulary.
pub fn normalize_os(token: &str) -> &str {
    match token {
        "apple-darwin" | "macos" => "darwin",
        "pc-windows-msvc" => "windows",
        "unknown-linux-gnu"
        | "unknown-linux-gnueabihf"
        | "unknown-linux-musl"
        | "unknown-linux-musleabihf" => "linux",
        other => other,
    }
}

/// Fold an architecture token seen in a file name into the platform vocabulary.
pub fn normalize_arch(token: &str) -> &str {
    match token {
        "32bit" | "i386" | "686" | "i686" => "386",
        "64bit" | "x86_64" => "amd64",
        "aarch64" => "arm64",
        "armv6" | "armv6hf" | "armv7" => "arm",
        "powerpc64" => "ppc64",
        "powerpc64le" => "ppc64le",
        other => other,
    }
}
