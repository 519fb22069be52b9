//! CLI command implementations.

pub mod groups;
pub mod sync;

use clap::ValueEnum;
use thiserror::Error;

/// Errors raised while interpreting command-line input.
#[derive(Debug, Error)]
pub enum CliError {
    /// `--after` is neither RFC 3339 nor `YYYY-MM-DD`.
    #[error("invalid date '{0}': expected RFC 3339 or YYYY-MM-DD")]
    InvalidDate(String),
}

/// Output format of a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}
