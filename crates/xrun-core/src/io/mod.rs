//! IO modules - side effects (network, filesystem, processes)

pub mod download;
pub mod exec;
pub mod extract;
