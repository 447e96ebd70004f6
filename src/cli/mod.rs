//! Command-line interface for copyforge.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
