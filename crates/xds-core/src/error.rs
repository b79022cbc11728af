//! Error types for snapshot distribution.
//!
//! This module provides [`XdsError`], the single error type shared by the
//! cache, the versioner and the callback pipeline. Every variant maps to a
//! gRPC status code so the transport layer can surface it unchanged.

use std::fmt;

/// Error type for snapshot distribution operations.
///
/// The cache never retries internally: every variant here is returned to
/// the direct caller, who decides whether to retry, long-poll or abort.
///
/// # Example
///
/// ```rust
/// use xds_core::XdsError;
///
/// let err = XdsError::SnapshotNotFound { node: "edge-1".to_string() };
/// assert!(err.is_not_found());
/// assert!(!err.is_no_change());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum XdsError {
    /// Snapshot is absent or is missing one of its supported types.
    #[error("inconsistent snapshot: {reason}")]
    InconsistentSnapshot {
        /// What made the snapshot inconsistent.
        reason: String,
    },

    /// No snapshot is stored for the requested node key.
    #[error("no snapshot found for node {node:?}")]
    SnapshotNotFound {
        /// The node key that was looked up.
        node: String,
    },

    /// The requested version already matches the current one.
    ///
    /// Not a hard failure: callers fall back to a long-poll watch.
    #[error("no change for {type_url}: version {version:?} is up to date")]
    NoChange {
        /// The type URL that was requested.
        type_url: String,
        /// The version the client already has.
        version: String,
    },

    /// One or more stream callbacks rejected a stream event.
    #[error("stream callbacks failed: {}", ErrorList(.errors))]
    Callbacks {
        /// Every error reported by the chain, in handler order.
        errors: Vec<XdsError>,
    },

    /// Resource encoding failed.
    #[error("encoding error for {type_url}: {message}")]
    EncodingError {
        /// The type URL being encoded.
        type_url: String,
        /// Error message.
        message: String,
    },

    /// Client stream closed unexpectedly.
    #[error("stream closed: {reason}")]
    StreamClosed {
        /// Reason for stream closure.
        reason: String,
    },

    /// Watch subscription was closed without a response.
    #[error("watch closed: watch_id={watch_id}")]
    WatchClosed {
        /// ID of the closed watch.
        watch_id: u64,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unexpected internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl XdsError {
    /// Create an internal error from any error type.
    pub fn internal<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an inconsistent-snapshot error.
    pub fn inconsistent(reason: impl Into<String>) -> Self {
        Self::InconsistentSnapshot {
            reason: reason.into(),
        }
    }

    /// Combine a list of errors into one.
    ///
    /// Returns `None` for an empty list and the error itself for a
    /// single-element list, so callers never see a one-item aggregate.
    pub fn aggregate(mut errors: Vec<XdsError>) -> Option<XdsError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Callbacks { errors }),
        }
    }

    /// Whether this is [`XdsError::NoChange`].
    #[must_use]
    pub fn is_no_change(&self) -> bool {
        matches!(self, Self::NoChange { .. })
    }

    /// Whether this is [`XdsError::SnapshotNotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SnapshotNotFound { .. })
    }
}

struct ErrorList<'a>(&'a [XdsError]);

impl fmt::Display for ErrorList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Convert to tonic::Status for gRPC responses.
///
/// This implementation maps each error variant to an appropriate gRPC status code.
impl From<XdsError> for tonic::Status {
    fn from(err: XdsError) -> Self {
        match &err {
            XdsError::InconsistentSnapshot { .. } => {
                tonic::Status::failed_precondition(err.to_string())
            }
            XdsError::SnapshotNotFound { .. } => tonic::Status::not_found(err.to_string()),
            XdsError::NoChange { .. } => tonic::Status::aborted(err.to_string()),
            XdsError::Callbacks { .. } => tonic::Status::permission_denied(err.to_string()),
            XdsError::EncodingError { .. } => tonic::Status::invalid_argument(err.to_string()),
            XdsError::StreamClosed { .. } => tonic::Status::unavailable(err.to_string()),
            XdsError::WatchClosed { .. } => tonic::Status::cancelled(err.to_string()),
            XdsError::Configuration(_) => tonic::Status::invalid_argument(err.to_string()),
            XdsError::Internal { .. } => tonic::Status::internal(err.to_string()),
        }
    }
}
