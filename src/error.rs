//! Error types for the ratewarden library.

use thiserror::Error;

/// Main error type for rate limiting operations.
#[derive(Error, Debug)]
pub enum RatewardenError {
    /// Malformed policy or governor configuration. Fatal at setup time,
    /// never produced on the request path.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The shared counter store could not complete an operation. Surfaced
    /// per request; the caller decides whether to fail open or closed.
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// I/O errors (configuration file reads)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ratewarden operations.
pub type Result<T> = std::result::Result<T, RatewardenError>;
