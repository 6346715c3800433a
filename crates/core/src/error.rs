//! Error types for Holdfast core
//!
//! Conflicts are NOT errors. A lost race is reported as a
//! [`ConflictReason`](crate::ConflictReason) inside an ordinary `Ok` value.
//! This enum covers the other class: malformed requests and configuration,
//! which are rejected before any concurrency subsystem is touched.

use thiserror::Error;

/// Programming and configuration errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Resource identity failed validation
    #[error("invalid resource id {id:?}: {reason}")]
    InvalidResource {
        /// The rejected identity (possibly truncated)
        id: String,
        /// Why it was rejected
        reason: String,
    },

    /// Operation parameter failed validation
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Resource is not part of the catalog and the store does not auto-create
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration could not be parsed or is inconsistent
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Holdfast core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build an [`Error::InvalidParameter`]
    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Check if this error is a rejected input (identity or parameter)
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::InvalidResource { .. } | Error::InvalidParameter { .. }
        )
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
