//! Command-line interface for pelato.
//!
//! Provides the gen, build, deploy, remove and brush commands.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
