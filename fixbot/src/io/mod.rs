//! I/O adapters for the fixbot pipeline.

pub mod config;
pub mod env;
pub mod fix_tool;
pub mod git;
pub mod github;
pub mod process;
pub mod workspace;
