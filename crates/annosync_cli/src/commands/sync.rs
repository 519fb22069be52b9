//! Sync command implementation.

use super::{CliError, OutputFormat};
use crate::credentials::Credentials;
use crate::http::ReqwestClient;
use crate::Verbosity;
use annosync_engine::{
    EngineConfig, HypothesisClient, RemNoteClient, SearchFilter, SortKey, SourceClient,
    SyncEngine, SyncStats,
};
use annosync_model::SyncPolicy;
use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use console::style;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Sort key accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    /// Creation time
    Created,
    /// Last update time
    Updated,
}

impl From<SortArg> for SortKey {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Created => SortKey::Created,
            SortArg::Updated => SortKey::Updated,
        }
    }
}

/// Options of one sync run.
#[derive(Debug, Clone)]
pub struct SyncArgs {
    /// Source group name.
    pub group: Option<String>,
    /// Sort key.
    pub sort: SortArg,
    /// Lower bound on the sort key.
    pub after: Option<DateTime<Utc>>,
    /// Annotated resource.
    pub uri: Option<String>,
    /// Update policy.
    pub policy: SyncPolicy,
    /// Manual-edit grace period, in seconds.
    pub edit_grace: u32,
    /// Output format.
    pub format: OutputFormat,
}

/// Parses `--after`: RFC 3339, or a bare `YYYY-MM-DD` meaning midnight UTC.
pub fn parse_after(value: &str) -> Result<DateTime<Utc>, CliError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
        .ok_or_else(|| CliError::InvalidDate(value.to_string()))
}

/// Runs the sync command.
pub fn run(
    args: &SyncArgs,
    credentials: &Credentials,
    verbosity: Verbosity,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(ReqwestClient::new(Duration::from_secs(30))?);
    let source = HypothesisClient::new(credentials.source_config()?, Arc::clone(&transport))?;
    let target = RemNoteClient::new(credentials.target_config()?, transport)?;

    let mut filter = SearchFilter::new().with_sort(args.sort.into());
    if let Some(name) = &args.group {
        let group = source.group_by_name(name).inspect_err(|_| {
            error!(group = %name, "group name was set but not found on the server");
        })?;
        filter = filter.with_group(group.id);
    }
    if let Some(uri) = &args.uri {
        filter = filter.with_uri(uri);
    }
    if let Some(after) = args.after {
        filter = filter.with_after(after);
    }
    debug!(?filter, "fetching annotations");

    let batch = source.fetch_batch(&filter)?;
    if verbosity >= Verbosity::Debug {
        println!("{}", serde_json::to_string(&batch)?);
    }

    let config = engine_config(args);
    let mut engine = SyncEngine::new(config, source, target, batch);
    let result = engine.sync_all();
    let stats = engine.stats();
    if verbosity > Verbosity::Quiet {
        print_stats(&stats, args.format)?;
    }
    result?;
    Ok(())
}

fn engine_config(args: &SyncArgs) -> EngineConfig {
    EngineConfig::new(args.policy)
        .with_edit_grace(chrono::Duration::seconds(i64::from(args.edit_grace)))
}

fn print_stats(stats: &SyncStats, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(stats)?),
        OutputFormat::Text => {
            println!("{}", style("Sync statistics").bold());
            println!("{stats}");
            if stats.blocked > 0 {
                println!(
                    "{} {} annotation(s) could not be placed in the hierarchy",
                    style("!").yellow(),
                    stats.blocked
                );
            } else {
                println!("{} done", style("✓").green());
            }
        }
    }
    Ok(())
}
