//! Handshake error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected widget endpoint or host origin configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Widget identifier is empty")]
    EmptyWidgetId,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no tuple origin: {0}")]
    OpaqueOrigin(String),

    #[error("Not a bare origin (path, query or fragment present): {0}")]
    NotAnOrigin(String),
}

/// Failure to obtain a one-time token from the issuer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenIssuanceError {
    /// The request was rejected locally before anything was sent.
    #[error("Invalid token request: {0}")]
    InvalidRequest(String),

    #[error("Token request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    /// The issuer answered with a non-success status.
    #[error("Issuer rejected request: HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Malformed issuer response: {0}")]
    MalformedResponse(String),
}

impl TokenIssuanceError {
    /// Returns true if repeating the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TokenIssuanceError::Timeout | TokenIssuanceError::Network(_) => true,
            TokenIssuanceError::Rejected { status, .. } => *status >= 500 || *status == 429,
            TokenIssuanceError::InvalidRequest(_) | TokenIssuanceError::MalformedResponse(_) => {
                false
            }
        }
    }

    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TokenIssuanceError::Timeout
        } else {
            TokenIssuanceError::Network(err.to_string())
        }
    }
}

/// Child-frame channel failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// No live content window behind the frame.
    #[error("Frame has no live content window")]
    FrameUnavailable,

    #[error("Refusing to post to a wildcard target origin")]
    WildcardTarget,

    #[error("Channel has been destroyed")]
    Destroyed,

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

/// Classification of the last error recorded by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TokenIssuance,
    OriginMismatch,
    FrameUnavailable,
    ProtocolViolation,
}

/// Handshake session error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("Token issuance failed: {0}")]
    TokenIssuance(#[from] TokenIssuanceError),

    /// A message or frame navigation from an origin other than the widget's.
    #[error("Untrusted origin: {origin}")]
    OriginMismatch { origin: String },

    #[error("Frame unavailable")]
    FrameUnavailable,

    /// Inbound message with an unexpected shape.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Retry limit reached after {0} attempts")]
    RetryExhausted(u32),

    #[error("Invalid handshake state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Handshake session disposed")]
    Disposed,

    #[error("Channel error: {0}")]
    Channel(ChannelError),
}

impl From<ChannelError> for HandshakeError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::FrameUnavailable => HandshakeError::FrameUnavailable,
            other => HandshakeError::Channel(other),
        }
    }
}

impl HandshakeError {
    /// The taxonomy bucket of this error, if it belongs to one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            HandshakeError::TokenIssuance(_) | HandshakeError::RetryExhausted(_) => {
                Some(ErrorKind::TokenIssuance)
            }
            HandshakeError::OriginMismatch { .. } => Some(ErrorKind::OriginMismatch),
            HandshakeError::FrameUnavailable | HandshakeError::Channel(_) => {
                Some(ErrorKind::FrameUnavailable)
            }
            HandshakeError::ProtocolViolation(_) => Some(ErrorKind::ProtocolViolation),
            HandshakeError::InvalidStateTransition(_) | HandshakeError::Disposed => None,
        }
    }

    /// Whether the end user may be told about this error.
    ///
    /// Origin and protocol violations are diagnostics only.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            HandshakeError::TokenIssuance(_) | HandshakeError::RetryExhausted(_)
        )
    }

    /// Returns true if the session stays usable and a later signal may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            HandshakeError::FrameUnavailable => true,
            HandshakeError::TokenIssuance(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias using HandshakeError.
pub type HandshakeResult<T> = Result<T, HandshakeError>;
