//! Account credentials, from flags, the environment, or a prompt.

use annosync_engine::{SourceConfig, TargetConfig};
use clap::Args;
use console::Term;
use std::io;

/// Credentials for both services.
///
/// Each value can be given as a flag, as an environment variable, or in a
/// `.env` file. Missing values are prompted for when running in a terminal.
#[derive(Debug, Clone, Default, Args)]
pub struct Credentials {
    /// Hypothes.is developer token
    #[arg(global = true, long, env = "HYP_KEY", hide_env_values = true)]
    pub hyp_key: Option<String>,

    /// Hypothes.is OAuth client ID (alternative to a token)
    #[arg(global = true, long, env = "HYP_CLIENT_ID")]
    pub hyp_client_id: Option<String>,

    /// Hypothes.is OAuth client secret
    #[arg(global = true, long, env = "HYP_CLIENT_SECRET", hide_env_values = true)]
    pub hyp_client_secret: Option<String>,

    /// RemNote API key
    #[arg(global = true, long, env = "REM_KEY", hide_env_values = true)]
    pub rem_key: Option<String>,

    /// RemNote user ID
    #[arg(global = true, long = "rem-user", env = "REM_USERID")]
    pub rem_user_id: Option<String>,
}

impl Credentials {
    /// Builds the Hypothes.is configuration, prompting for a token if no
    /// credentials were given.
    pub fn source_config(&self) -> io::Result<SourceConfig> {
        let config = SourceConfig::from_parts(
            self.hyp_key.clone(),
            self.hyp_client_id.clone(),
            self.hyp_client_secret.clone(),
        );
        if config.credentials.is_some() {
            return Ok(config);
        }
        Ok(match prompt("Hypothes.is API key", true)? {
            Some(token) => config.with_token(token),
            None => config,
        })
    }

    /// Builds the RemNote configuration, prompting for missing values.
    pub fn target_config(&self) -> io::Result<TargetConfig> {
        let api_key = match non_empty(&self.rem_key) {
            Some(key) => Some(key),
            None => prompt("RemNote API key", true)?,
        };
        let user_id = match non_empty(&self.rem_user_id) {
            Some(user) => Some(user),
            None => prompt("RemNote user ID", false)?,
        };
        Ok(TargetConfig::new(api_key, user_id))
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Asks for a value on the terminal. Returns `None` without a terminal or
/// when the answer is blank.
fn prompt(label: &str, secret: bool) -> io::Result<Option<String>> {
    let term = Term::stderr();
    if !term.is_term() {
        return Ok(None);
    }
    term.write_str(&format!("{label}: "))?;
    let answer = if secret {
        term.read_secure_line()?
    } else {
        term.read_line()?
    };
    let answer = answer.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}
