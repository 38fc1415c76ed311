//! Host shell error types.

use host_config::ConfigError;
use ott_handshake::{HandshakeError, TokenIssuanceError};
use thiserror::Error;

/// Error type for host shell and session-check operations.
#[derive(Debug, Error)]
pub enum HostError {
    /// The host page has no authenticated session.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// No widget frame is mounted.
    #[error("No widget frame mounted")]
    NoFrame,

    /// The host backend returned a non-success status.
    #[error("Backend error: HTTP {status}: {detail}")]
    Backend { status: u16, detail: String },

    /// Network or transport-level HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Token issuance error: {0}")]
    Issuer(#[from] TokenIssuanceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias using HostError.
pub type HostResult<T> = Result<T, HostError>;
