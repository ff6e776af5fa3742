//! Command-line interface for scriptforge.
//!
//! Provides commands for serving agent roles, running the pipeline,
//! and inspecting quota and fleet status.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
