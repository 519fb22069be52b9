//! Provenance stamps.
//!
//! Every note created from an annotation carries a stamp in its `source`
//! field:
//!
//! ```text
//! Imported from Hypothes.is: < {source_url} >. Last sync: {rfc3339}
//! ```
//!
//! The stamp is the only record of when a note was last synced. RemNote turns
//! the `< url >` span into a link element, so on the way back the timestamp is
//! searched for in the remaining text fragments.

use crate::error::{ModelError, ModelResult};
use crate::note::{Note, RichText};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Name of the annotation service as written in stamps.
pub const SOURCE_LABEL: &str = "Hypothes.is";

static STAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^Imported from {}: < (?P<source_url>.*?) >\. Last sync: (?P<last_sync_iso>.*)$",
        regex::escape(SOURCE_LABEL)
    ))
    .expect("stamp pattern")
});

static LAST_SYNC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Last sync: (?P<last_sync_iso>.*)$").expect("last sync pattern"));

/// Which annotation a note was generated from, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceStamp {
    /// Provenance key of the annotation.
    pub source_url: String,
    /// Time of the last sync.
    pub last_sync: DateTime<Utc>,
}

impl ProvenanceStamp {
    /// Creates a stamp.
    pub fn new(source_url: impl Into<String>, last_sync: DateTime<Utc>) -> Self {
        Self {
            source_url: source_url.into(),
            last_sync,
        }
    }

    /// Creates a stamp for the current time, at the microsecond precision
    /// the rendered stamp keeps.
    pub fn now(source_url: impl Into<String>) -> Self {
        Self::new(source_url, Utc::now().trunc_subsecs(6))
    }

    /// Renders the stamp as written to the note's source field.
    pub fn render(&self) -> String {
        format!(
            "Imported from {}: < {} >. Last sync: {}",
            SOURCE_LABEL,
            self.source_url,
            self.last_sync.to_rfc3339_opts(SecondsFormat::Micros, false)
        )
    }

    /// Parses a rendered stamp.
    pub fn parse(statement: &str) -> ModelResult<Self> {
        let captures = STAMP_RE
            .captures(statement.trim())
            .ok_or_else(|| ModelError::MalformedStamp(statement.to_string()))?;
        let last_sync = parse_timestamp(&captures["last_sync_iso"])
            .ok_or_else(|| ModelError::MalformedStamp(statement.to_string()))?;
        Ok(Self::new(&captures["source_url"], last_sync))
    }
}

impl fmt::Display for ProvenanceStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Parses an ISO 8601 timestamp. Timestamps without an offset are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Last sync time recorded in a note's source field.
///
/// When several fragments carry a stamp the last one wins; a stamp whose
/// timestamp does not parse counts as no sync at all.
pub fn last_sync(source: &RichText) -> Option<DateTime<Utc>> {
    source
        .text_fragments()
        .filter_map(|fragment| LAST_SYNC_RE.captures(fragment))
        .last()
        .and_then(|captures| parse_timestamp(&captures["last_sync_iso"]))
}

/// Returns true if `note` predates an annotation last updated at `updated`.
pub fn is_stale(updated: DateTime<Utc>, note: &Note) -> bool {
    match last_sync(&note.source) {
        Some(synced) => updated > synced,
        None => true,
    }
}
