//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while decoding or parsing model values.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A JSON payload did not match the expected shape.
    #[error("invalid {entity} payload: {source}")]
    InvalidPayload {
        /// Kind of entity being decoded.
        entity: &'static str,
        /// Underlying decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// Unknown update policy name.
    #[error("unknown update policy '{0}' (expected all, safe, safe-strict or forbid)")]
    UnknownPolicy(String),

    /// A provenance stamp could not be parsed.
    #[error("malformed provenance stamp: {0}")]
    MalformedStamp(String),
}

impl ModelError {
    /// Wraps a serde error for the given entity kind.
    pub fn invalid_payload(entity: &'static str, source: serde_json::Error) -> Self {
        Self::InvalidPayload { entity, source }
    }
}
