//! xrun - fetch, verify, cache and run
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Downloads a platform specific executable once, checks its digest,
//! keeps it in a content addressed cache and replaces itself with it.
//!
//! # Cache Layout
//!
//! ```text
//! $XRUN_CACHE_HOME/v1/
//! └── <host>/<url path>/<algorithm-hex | _>/
//!     ├── <basename>                  # raw executable, or
//!     ├── <basename>/...              # unpacked archive
//!     └── <basename>-metadata.json    # ETag / Last-Modified
//! ```

pub mod cmd;
pub mod duration;

use std::ffi::OsString;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "xrun")]
#[command(author, version, about = "xrun - fetch, verify, cache and run an executable")]
#[command(subcommand_negates_reqs = true, args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// URL matcher: [OS/ARCH=]URL[#ALGORITHM-HEXDIGEST], first match wins
    #[arg(short = 'u', long = "url", value_name = "MATCHER", required = true)]
    pub urls: Vec<String>,

    /// Executable path within archive matcher: [OS/ARCH=]PATH, first match wins
    #[arg(short = 'p', long = "archive-exe-path", value_name = "MATCHER")]
    pub archive_exe_paths: Vec<String>,

    /// Fetch and check the executable but do not run it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Download timeout, e.g. 90s, 5m, 1h30m; 0 for none
    #[arg(
        short = 't',
        long,
        value_name = "DURATION",
        default_value = "5m",
        value_parser = duration::parse
    )]
    pub http_timeout: Duration,

    /// Arguments passed to the executable
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<OsString>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate xrun command line arguments for various tools
    Generate {
        #[command(subcommand)]
        command: GenerateCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum GenerateCommands {
    /// Tool in a GitHub project's release assets
    Github {
        /// Repository owner
        owner: String,
        /// Repository name, defaults to the owner
        project: Option<String>,
        /// Tool name to look for in archives, defaults to the project
        #[arg(short = 'T', long)]
        tool: Option<String>,
        /// Release tag, defaults to automatically selected
        #[arg(short, long)]
        release: Option<String>,
    },
    /// Tool in a PyPI project's platform wheels
    Pypi {
        /// Project name
        project: String,
        /// Tool name to look for in wheels, defaults to the project
        #[arg(short = 'T', long)]
        tool: Option<String>,
        /// Project version, defaults to automatically selected
        #[arg(short, long)]
        release: Option<String>,
    },
    /// terraform from releases.hashicorp.com
    Terraform {
        /// Version, defaults to automatically selected
        #[arg(short, long)]
        release: Option<String>,
    },
    /// black from its GitHub releases
    Black {
        /// Release tag, defaults to automatically selected
        #[arg(short, long)]
        release: Option<String>,
    },
}
