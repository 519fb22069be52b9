//! Error types for the sync engine.

use annosync_model::{AnnotationId, ModelError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Hierarchy gaps (a parent or elder sibling not synced yet) are not errors;
/// they are reported as `SyncOutcome::BlockedOn` and resolved by the engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Credentials for a remote service are missing.
    #[error("missing credentials for {service}")]
    MissingCredentials {
        /// Service that needs the credentials.
        service: &'static str,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation could be retried.
        retryable: bool,
    },

    /// Remote service answered with a non-success status.
    #[error("{endpoint} returned HTTP {status}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Endpoint that was called.
        endpoint: String,
    },

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Model value could not be decoded.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Named group does not exist in the account.
    #[error("no group named '{0}' in this account")]
    GroupNotFound(String),

    /// Annotation has neither a target source nor a URI.
    #[error("annotation {annotation_id} has no source URI")]
    MissingSourceUri {
        /// Annotation ID.
        annotation_id: AnnotationId,
    },

    /// The reply hierarchy references itself.
    #[error("cyclic reply hierarchy at annotation {annotation_id}")]
    CyclicHierarchy {
        /// Annotation that closed the cycle.
        annotation_id: AnnotationId,
    },

    /// Hierarchy data contradicts itself.
    #[error("hierarchy invariant violated: {0}")]
    HierarchyInvariant(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the failed call could be retried.
    ///
    /// The engine never retries on its own; this is for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("bad certificate").is_retryable());
        assert!(SyncError::HttpStatus {
            status: 503,
            endpoint: "/search".into()
        }
        .is_retryable());
        assert!(!SyncError::HttpStatus {
            status: 404,
            endpoint: "/get".into()
        }
        .is_retryable());
        assert!(!SyncError::MissingCredentials { service: "RemNote" }.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::CyclicHierarchy {
            annotation_id: AnnotationId::from("a1"),
        };
        assert_eq!(err.to_string(), "cyclic reply hierarchy at annotation a1");

        let err = SyncError::HttpStatus {
            status: 500,
            endpoint: "/create".into(),
        };
        assert_eq!(err.to_string(), "/create returned HTTP 500");
    }
}
