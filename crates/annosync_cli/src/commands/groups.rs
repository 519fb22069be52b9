//! Groups command implementation.

use super::OutputFormat;
use crate::credentials::Credentials;
use crate::http::ReqwestClient;
use annosync_engine::HypothesisClient;
use annosync_model::Group;
use console::style;
use std::time::Duration;

/// Runs the groups command.
pub fn run(credentials: &Credentials, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let transport = ReqwestClient::new(Duration::from_secs(30))?;
    let source = HypothesisClient::new(credentials.source_config()?, transport)?;
    let groups = source.groups()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&groups)?),
        OutputFormat::Text => {
            if groups.is_empty() {
                println!("No groups visible to this account");
            }
            for group in &groups {
                println!("{}", format_group(group));
            }
        }
    }
    Ok(())
}

fn format_group(group: &Group) -> String {
    format!(
        "{}  {} ({})",
        style(group.id.as_str()).dim(),
        group.name,
        group.group_type
    )
}
