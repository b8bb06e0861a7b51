//! Error types for the Turnstile service.

use thiserror::Error;

use crate::ratelimit::{CostError, MissingContextError, PolicyParseError};

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Malformed rate limit policy string
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyParseError),

    /// The request lacks the data its policy is segmented by
    #[error("Missing context: {0}")]
    MissingContext(#[from] MissingContextError),

    /// The request cost could not be computed
    #[error("Cost error: {0}")]
    Cost(#[from] CostError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

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
