//! CLI command implementations.

pub mod common;
pub mod config;
pub mod install;
pub mod process;
pub mod worker;
