//! Update policies.

use crate::error::ModelError;
use std::fmt;
use std::str::FromStr;

/// Controls whether existing notes may be overwritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SyncPolicy {
    /// Always update, and first force-update outdated parents and elder siblings.
    All,
    /// Update only notes not modified by hand since the last sync; still
    /// brings outdated parents and elder siblings up to date.
    Safe,
    /// Like `Safe`, but never touches parents or siblings outside the batch.
    #[default]
    SafeStrict,
    /// Never update existing notes; only create missing ones.
    Forbid,
}

impl SyncPolicy {
    /// Returns true if existing notes may be updated at all.
    pub fn allows_updates(self) -> bool {
        !matches!(self, SyncPolicy::Forbid)
    }

    /// Returns true if notes edited by hand after the last sync must be left alone.
    pub fn safe_updates_only(self) -> bool {
        matches!(self, SyncPolicy::Safe | SyncPolicy::SafeStrict)
    }

    /// Returns true if outdated parents and elder siblings must be synced first.
    pub fn propagates_updates(self) -> bool {
        matches!(self, SyncPolicy::All | SyncPolicy::Safe)
    }

    /// Canonical name, as accepted by `FromStr`.
    pub fn as_str(self) -> &'static str {
        match self {
            SyncPolicy::All => "all",
            SyncPolicy::Safe => "safe",
            SyncPolicy::SafeStrict => "safe-strict",
            SyncPolicy::Forbid => "forbid",
        }
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncPolicy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(SyncPolicy::All),
            "safe" => Ok(SyncPolicy::Safe),
            "safe-strict" | "safe_strict" | "safestrict" => Ok(SyncPolicy::SafeStrict),
            "forbid" => Ok(SyncPolicy::Forbid),
            _ => Err(ModelError::UnknownPolicy(s.to_string())),
        }
    }
}
