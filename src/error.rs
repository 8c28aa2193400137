//! Error types for Signalroom.

use crate::validation::ValidationErrors;
use thiserror::Error;

/// The main error type for Signalroom.
#[derive(Error, Debug)]
pub enum Error {
    /// IO errors (file operations, local storage, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the backend
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Signal creation or edit rejected
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Entity lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or state
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Network connectivity errors
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limiting errors
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    /// Generic application error
    #[error("{0}")]
    Application(String),
}

/// Alias for Result with our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl Error {
    /// Create a new API error from a response status and body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a new config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new auth error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a new not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new application error.
    pub fn application(msg: impl Into<String>) -> Self {
        Self::Application(msg.into())
    }

    /// Check if this error is recoverable (the call can be retried).
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
