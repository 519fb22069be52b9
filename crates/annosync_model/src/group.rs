//! Hypothes.is groups.

use crate::annotation::GroupId;
use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Visibility of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    /// Members only.
    Private,
    /// Anyone can read and write.
    Open,
    /// Anyone can read, members write.
    Restricted,
    /// A type this crate does not know about.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupType::Private => "private",
            GroupType::Open => "open",
            GroupType::Restricted => "restricted",
            GroupType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A group annotations can be posted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group ID.
    pub id: GroupId,
    /// Display name. Not unique.
    pub name: String,
    /// Visibility.
    #[serde(rename = "type")]
    pub group_type: GroupType,
    /// Whether the group is publicly listed.
    #[serde(default)]
    pub public: Option<bool>,
}

impl Group {
    /// Decodes a group from its API JSON representation.
    pub fn from_value(value: serde_json::Value) -> ModelResult<Self> {
        serde_json::from_value(value).map_err(|e| ModelError::invalid_payload("group", e))
    }
}
