//! Command-line interface for rlduels.
//!
//! Provides commands for simulating trajectory pairs, labeling them,
//! and exporting the collected preferences.

mod commands;

pub use commands::{parse_answer, parse_cli, run, run_with_cli, Answer, Cli};
