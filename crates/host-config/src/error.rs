//! Configuration error types.

use ott_handshake::EndpointError;
use thiserror::Error;

/// Error type for loading and validating host configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Rejected widget endpoint or host origin
    #[error("Invalid widget endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    /// A value that parses but is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Path error (e.g., home directory not found)
    #[error("Path error: {0}")]
    Path(String),
}

/// Result type alias using ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;
