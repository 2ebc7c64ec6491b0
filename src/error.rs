//! Error types for the Turnstile service.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// A denied request is not an error: it is a [`Decision`](crate::ratelimit::Decision)
/// with `permitted == false`, turned into a response by the admission layer.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limiting policy is malformed
    #[error("Invalid rate limit policy: {0}")]
    InvalidPolicy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TurnstileError {
    fn from(err: config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
