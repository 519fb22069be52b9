//! Configuration for the sync engine and its clients.

use crate::error::{SyncError, SyncResult};
use annosync_model::SyncPolicy;
use chrono::Duration;

/// Default capacity of the client-side LRU caches.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Default number of annotations requested per search page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Default Hypothes.is API root.
pub const HYPOTHESIS_API_URL: &str = "https://hypothes.is/api";

/// Default RemNote API root.
pub const REMNOTE_API_URL: &str = "https://api.remnote.io/api/v0";

/// Configuration for a sync run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Update policy.
    pub policy: SyncPolicy,
    /// How far a note's modification time may trail its last sync stamp
    /// before the note counts as edited by hand. Absorbs the gap between
    /// stamping a note and the remote service recording the write.
    pub edit_grace: Duration,
}

impl EngineConfig {
    /// Creates a configuration with the given policy.
    pub fn new(policy: SyncPolicy) -> Self {
        Self {
            policy,
            edit_grace: Duration::seconds(10),
        }
    }

    /// Sets the update policy.
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the manual-edit grace period.
    pub fn with_edit_grace(mut self, grace: Duration) -> Self {
        self.edit_grace = grace;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(SyncPolicy::default())
    }
}

/// Credentials for the Hypothes.is API.
#[derive(Clone, PartialEq, Eq)]
pub enum SourceCredentials {
    /// Personal developer token (bearer auth).
    Token(String),
    /// OAuth client pair (basic auth).
    ClientPair {
        /// Client ID.
        client_id: String,
        /// Client secret.
        client_secret: String,
    },
}

impl std::fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceCredentials::Token(_) => f.write_str("Token(***)"),
            SourceCredentials::ClientPair { client_id, .. } => {
                write!(f, "ClientPair({client_id}, ***)")
            }
        }
    }
}

/// Configuration for the Hypothes.is client.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// API root URL.
    pub base_url: String,
    /// Credentials, if any were provided.
    pub credentials: Option<SourceCredentials>,
    /// Search page size.
    pub page_size: u32,
    /// Annotation cache capacity.
    pub cache_capacity: usize,
}

impl SourceConfig {
    /// Creates a configuration for the public Hypothes.is API, without credentials.
    pub fn new() -> Self {
        Self {
            base_url: HYPOTHESIS_API_URL.to_string(),
            credentials: None,
            page_size: DEFAULT_PAGE_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Builds credentials from optional parts: a non-empty token wins over a
    /// client pair; a pair needs both halves.
    pub fn from_parts(
        token: Option<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        let config = Self::new();
        match (token, client_id, client_secret) {
            (Some(token), _, _) if !token.is_empty() => config.with_token(token),
            (_, Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                config.with_client_pair(id, secret)
            }
            _ => config,
        }
    }

    /// Uses a personal developer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.credentials = Some(SourceCredentials::Token(token.into()));
        self
    }

    /// Uses an OAuth client pair.
    pub fn with_client_pair(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.credentials = Some(SourceCredentials::ClientPair {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        });
        self
    }

    /// Sets the API root URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the search page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the cache capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Returns the credentials, or `MissingCredentials`.
    pub fn require_credentials(&self) -> SyncResult<&SourceCredentials> {
        self.credentials
            .as_ref()
            .ok_or(SyncError::MissingCredentials {
                service: "Hypothes.is",
            })
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the RemNote client.
#[derive(Clone)]
pub struct TargetConfig {
    /// API root URL.
    pub base_url: String,
    /// API key.
    pub api_key: Option<String>,
    /// User ID.
    pub user_id: Option<String>,
    /// Note cache capacity.
    pub cache_capacity: usize,
}

impl TargetConfig {
    /// Creates a configuration for the public RemNote API.
    pub fn new(api_key: Option<String>, user_id: Option<String>) -> Self {
        Self {
            base_url: REMNOTE_API_URL.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            user_id: user_id.filter(|u| !u.is_empty()),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Sets the API root URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the cache capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Returns `(api_key, user_id)`, or `MissingCredentials`.
    pub fn require_credentials(&self) -> SyncResult<(&str, &str)> {
        match (&self.api_key, &self.user_id) {
            (Some(key), Some(user)) => Ok((key, user)),
            _ => Err(SyncError::MissingCredentials { service: "RemNote" }),
        }
    }
}

impl std::fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("user_id", &self.user_id)
            .field("cache_capacity", &self.cache_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::default()
            .with_policy(SyncPolicy::All)
            .with_edit_grace(Duration::seconds(2));
        assert_eq!(config.policy, SyncPolicy::All);
        assert_eq!(config.edit_grace, Duration::seconds(2));
        assert_eq!(EngineConfig::default().policy, SyncPolicy::SafeStrict);
    }

    #[test]
    fn source_credentials_from_parts() {
        let config = SourceConfig::from_parts(Some("tok".into()), Some("id".into()), None);
        assert_eq!(
            config.require_credentials().unwrap(),
            &SourceCredentials::Token("tok".into())
        );

        let config =
            SourceConfig::from_parts(Some(String::new()), Some("id".into()), Some("s".into()));
        assert!(matches!(
            config.require_credentials().unwrap(),
            SourceCredentials::ClientPair { .. }
        ));

        let config = SourceConfig::from_parts(None, Some("id".into()), None);
        assert!(matches!(
            config.require_credentials(),
            Err(SyncError::MissingCredentials { service: "Hypothes.is" })
        ));
    }

    #[test]
    fn target_credentials_required() {
        let config = TargetConfig::new(Some("key".into()), Some(String::new()));
        assert!(config.require_credentials().is_err());

        let config = TargetConfig::new(Some("key".into()), Some("user".into()));
        assert_eq!(config.require_credentials().unwrap(), ("key", "user"));
        assert!(!format!("{config:?}").contains("key\""));
    }

    #[test]
    fn page_size_is_at_least_one() {
        assert_eq!(SourceConfig::new().with_page_size(0).page_size, 1);
        assert_eq!(SourceConfig::new().page_size, DEFAULT_PAGE_SIZE);
    }
}
