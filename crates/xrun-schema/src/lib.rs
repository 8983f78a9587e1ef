//! Pure data and decision logic for `xrun`: platform strings, matchers,
//! digests, checksum manifests and release asset classification.
#![allow(clippy::missing_errors_doc)]

pub mod categorize;
pub mod checksums;
pub mod hash;
pub mod matcher;
pub mod pep440;
pub mod platform;
pub mod pypi;
pub mod release;

// Re-exports
pub use categorize::{Categorized, Override, categorize};
pub use checksums::{Checksums, ChecksumsError, Entry};
pub use hash::{HashAlgorithm, HashError, HashSpec};
pub use matcher::{MatcherError, PlatformMatch};
pub use pep440::{Version, VersionError};
pub use platform::Platform;

/// Cache layout version, the first path segment under the cache root.
pub const CACHE_VERSION: &str = "v1";

/// Digest path segment used when no digest was requested.
pub const NO_DIGEST_PLACEHOLDER: &str = "_";
