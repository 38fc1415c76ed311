//! Token issuer seam and its HTTP implementation.

use crate::error::TokenIssuanceError;
use crate::token::OneTimeToken;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Upper bound on one token request before it counts as a timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of one-time tokens.
///
/// Each call is an independent network request; implementations must not
/// cache or reuse tokens.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn request_token(
        &self,
        widget_id: &str,
        requesting_origin: &str,
    ) -> Result<OneTimeToken, TokenIssuanceError>;
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    model_id: &'a str,
    origin: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    ott: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Issuer backed by the host backend's token endpoint.
#[derive(Clone)]
pub struct HttpTokenIssuer {
    http_client: Client,
    issuer_url: String,
    host_origin: String,
    session_cookie: Option<String>,
}

impl HttpTokenIssuer {
    pub fn new(
        issuer_url: impl Into<String>,
        host_origin: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TokenIssuanceError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TokenIssuanceError::from_transport)?;

        Ok(Self {
            http_client,
            issuer_url: issuer_url.into(),
            host_origin: host_origin.into(),
            session_cookie: None,
        })
    }

    /// Forward an authenticated session cookie with every request.
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }
}

impl std::fmt::Debug for HttpTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenIssuer")
            .field("issuer_url", &self.issuer_url)
            .field("host_origin", &self.host_origin)
            .field("has_session", &self.session_cookie.is_some())
            .finish()
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn request_token(
        &self,
        widget_id: &str,
        requesting_origin: &str,
    ) -> Result<OneTimeToken, TokenIssuanceError> {
        if widget_id.trim().is_empty() {
            return Err(TokenIssuanceError::InvalidRequest(
                "widget id is empty".to_string(),
            ));
        }
        if requesting_origin != self.host_origin {
            return Err(TokenIssuanceError::InvalidRequest(format!(
                "requesting origin {} is not the host origin",
                requesting_origin
            )));
        }

        tracing::debug!(widget_id, "Requesting one-time token");

        let mut request = self
            .http_client
            .post(&self.issuer_url)
            .header(CONTENT_TYPE, "application/json")
            .json(&TokenRequest {
                model_id: widget_id,
                origin: requesting_origin,
            });
        if let Some(cookie) = &self.session_cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(TokenIssuanceError::from_transport)?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(TokenIssuanceError::from_transport)?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => parsed.detail,
                Err(_) => format!("upstream error ({})", summarize_response_body(&body)),
            };
            tracing::warn!(status = status.as_u16(), detail = %detail, "Token issuer rejected request");
            return Err(TokenIssuanceError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            TokenIssuanceError::MalformedResponse(format!(
                "{} ({})",
                e,
                summarize_response_body(&body)
            ))
        })?;

        OneTimeToken::new(parsed.ott, parsed.expires_in)
    }
}
