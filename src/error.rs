//! Unified error types for Holdfast.
//!
//! Lost races are not errors: they come back as
//! [`Outcome::Conflict`](crate::Outcome::Conflict). This type covers requests
//! that could never succeed and failures to start the service.

use thiserror::Error;

/// All Holdfast errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed resource id or parameter
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Slot outside the catalog while unknown slots are rejected
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error (configuration file, sweeper thread)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Holdfast operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if the request itself was malformed.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// HTTP status a request layer should answer with.
    ///
    /// Conflicts map to 409 via [`Outcome::status_code`](crate::Outcome::status_code).
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidInput(_) => 400,
            Error::NotFound(_) => 404,
            Error::Config(_) | Error::Io(_) => 500,
        }
    }
}

// Convert from internal core errors
impl From<holdfast_core::Error> for Error {
    fn from(e: holdfast_core::Error) -> Self {
        use holdfast_core::Error as CoreError;
        match e {
            err @ (CoreError::InvalidResource { .. } | CoreError::InvalidParameter { .. }) => {
                Error::InvalidInput(err.to_string())
            }
            CoreError::NotFound(what) => Error::NotFound(what),
            CoreError::Config(msg) => Error::Config(msg),
            CoreError::Io(io_err) => Error::Io(io_err),
        }
    }
}
