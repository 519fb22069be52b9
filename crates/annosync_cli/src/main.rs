//! annosync CLI
//!
//! Mirrors Hypothes.is annotations into RemNote.
//!
//! # Commands
//!
//! - `sync` - Fetch annotations and create or update their notes
//! - `groups` - List the Hypothes.is groups visible to the account
//! - `version` - Show version information
//!
//! Credentials are read from flags, the environment (`HYP_KEY`,
//! `HYP_CLIENT_ID`, `HYP_CLIENT_SECRET`, `REM_KEY`, `REM_USERID`) or a `.env`
//! file, and prompted for when missing.

mod commands;
mod credentials;
mod http;

use annosync_model::SyncPolicy;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::sync::{SortArg, SyncArgs};
use commands::OutputFormat;
use credentials::Credentials;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Sync Hypothes.is annotations with notes in a RemNote account.
#[derive(Parser)]
#[command(name = "annosync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Only print errors
    #[arg(global = true, short, long)]
    quiet: bool,

    /// Print progress information
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Print every step, and dump fetched annotations as JSON
    #[arg(global = true, long)]
    debug: bool,

    #[command(flatten)]
    credentials: Credentials,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch annotations and create or update their notes
    Sync {
        /// Name of the Hypothes.is group the annotations are stored in
        #[arg(short, long, alias = "hyp-group")]
        group: Option<String>,

        /// Field to sort annotations by
        #[arg(short, long, value_enum, default_value_t = SortArg::Created)]
        sort: SortArg,

        /// Only annotations created or updated after this date
        #[arg(short, long, value_parser = commands::sync::parse_after)]
        after: Option<DateTime<Utc>>,

        /// Web page address, or URN of another resource (DOI, PDF fingerprint)
        #[arg(short, long)]
        uri: Option<String>,

        /// Update policy (all, safe, safe-strict, forbid)
        #[arg(short, long, default_value_t = SyncPolicy::SafeStrict)]
        policy: SyncPolicy,

        /// Seconds a note may change after its sync stamp and still count as unedited
        #[arg(long, default_value_t = 10)]
        edit_grace: u32,

        /// Output format for the statistics
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List the Hypothes.is groups visible to the account
    Groups {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

/// How much the CLI prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Errors and warnings.
    Normal,
    /// Progress information.
    Verbose,
    /// Every step.
    Debug,
}

impl Verbosity {
    /// Picks the level from the flags; `--quiet` wins, then `--verbose`.
    pub fn from_flags(quiet: bool, verbose: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }

    /// Log filter directive for this level.
    pub fn filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "info",
            Verbosity::Debug => "debug",
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose, cli.debug);

    // RUST_LOG overrides the flags
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli, verbosity) {
        error!("{e}");
        return Err(e);
    }
    Ok(())
}

fn run(cli: Cli, verbosity: Verbosity) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Sync {
            group,
            sort,
            after,
            uri,
            policy,
            edit_grace,
            format,
        } => {
            let args = SyncArgs {
                group,
                sort,
                after,
                uri,
                policy,
                edit_grace,
                format,
            };
            commands::sync::run(&args, &cli.credentials, verbosity)?;
        }
        Commands::Groups { format } => {
            commands::groups::run(&cli.credentials, format)?;
        }
        Commands::Version => {
            println!("annosync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("annosync engine v{}", annosync_engine::VERSION);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_precedence() {
        assert_eq!(Verbosity::from_flags(false, false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(true, true, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, true, true), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, false, true), Verbosity::Debug);
        assert_eq!(Verbosity::Debug.filter(), "debug");
        assert_eq!(Verbosity::Normal.filter(), "warn");
    }

    #[test]
    fn sync_flags_parse() {
        let cli = Cli::try_parse_from([
            "annosync",
            "sync",
            "--hyp-group",
            "Reading",
            "--sort",
            "updated",
            "--after",
            "2021-01-01",
            "--policy",
            "forbid",
            "--edit-grace",
            "30",
            "--format",
            "json",
            "--quiet",
        ])
        .unwrap();
        assert!(cli.quiet);
        match cli.command {
            Commands::Sync {
                group,
                sort,
                after,
                policy,
                edit_grace,
                format,
                uri,
            } => {
                assert_eq!(group.as_deref(), Some("Reading"));
                assert_eq!(sort, SortArg::Updated);
                assert!(after.is_some());
                assert_eq!(policy, SyncPolicy::Forbid);
                assert_eq!(edit_grace, 30);
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(uri, None);
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(Cli::try_parse_from(["annosync", "sync", "--policy", "sometimes"]).is_err());
    }

    #[test]
    fn edit_grace_defaults_to_ten_seconds() {
        let cli = Cli::try_parse_from(["annosync", "sync"]).unwrap();
        match cli.command {
            Commands::Sync { edit_grace, .. } => assert_eq!(edit_grace, 10),
            _ => panic!("expected sync"),
        }
        assert!(Cli::try_parse_from(["annosync", "sync", "--edit-grace", "-1"]).is_err());
    }
}
