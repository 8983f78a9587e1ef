//! Side-effecting half of `xrun`: cache layout, fetching, unpacking,
//! launching, and the pipelines built from them.
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cache;
pub mod generate;
pub mod io;
pub mod paths;
pub mod pipeline;

pub use paths::*;
pub use pipeline::{Outcome, RunConfig, RunError, run};

/// User Agent string sent with every request
pub const USER_AGENT: &str = concat!("xrun/", env!("CARGO_PKG_VERSION"));
