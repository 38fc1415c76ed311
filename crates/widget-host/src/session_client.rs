//! Client for the host backend's session endpoints (`/auth/*`).

use crate::error::{HostError, HostResult};
use async_trait::async_trait;
use host_config::HostConfig;
use reqwest::header::COOKIE;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// The signed-in host user, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HostUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Result of checking the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Authenticated(HostUser),
    Unauthenticated,
}

impl SessionStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionStatus::Authenticated(_))
    }

    pub fn user(&self) -> Option<&HostUser> {
        match self {
            SessionStatus::Authenticated(user) => Some(user),
            SessionStatus::Unauthenticated => None,
        }
    }
}

/// Where to send the user to start the identity provider's login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginStart {
    pub auth_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Host backend session operations.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Check the current session. Called once at page load.
    async fn check_session(&self) -> HostResult<SessionStatus>;

    async fn start_login(&self) -> HostResult<LoginStart>;

    async fn logout(&self) -> HostResult<()>;
}

/// HTTP implementation of [`SessionBackend`].
#[derive(Clone)]
pub struct SessionClient {
    http_client: Client,
    session_url: String,
    login_url: String,
    logout_url: String,
    session_cookie: Option<String>,
}

impl SessionClient {
    pub fn new(config: &HostConfig) -> HostResult<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http_client,
            session_url: config.session_url()?,
            login_url: config.login_url()?,
            logout_url: config.logout_url()?,
            session_cookie: None,
        })
    }

    /// Send the host session cookie with every request.
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    fn with_credentials(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.session_cookie {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        }
    }

    /// Check HTTP response for errors.
    async fn check_response(response: reqwest::Response) -> HostResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .map(|parsed| parsed.detail)
            .unwrap_or_else(|_| format!("len={}", body.len()));
        warn!(status, detail = %detail, "Host backend request failed");
        Err(HostError::Backend { status, detail })
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("session_url", &self.session_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionBackend for SessionClient {
    async fn check_session(&self) -> HostResult<SessionStatus> {
        let response = self
            .with_credentials(self.http_client.get(&self.session_url))
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("No host session");
            return Ok(SessionStatus::Unauthenticated);
        }

        let response = Self::check_response(response).await?;
        let user: HostUser = serde_json::from_str(&response.text().await?)?;
        info!(user_id = user.id.as_deref().unwrap_or("<none>"), "Host session found");
        Ok(SessionStatus::Authenticated(user))
    }

    async fn start_login(&self) -> HostResult<LoginStart> {
        let response = self
            .with_credentials(self.http_client.get(&self.login_url))
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let start: LoginStart = serde_json::from_str(&response.text().await?)?;
        Ok(start)
    }

    async fn logout(&self) -> HostResult<()> {
        let response = self
            .with_credentials(self.http_client.post(&self.logout_url))
            .send()
            .await?;
        Self::check_response(response).await?;
        info!("Host session logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_user_tolerates_missing_fields() {
        let user: HostUser = serde_json::from_str(r#"{"email":"a@b.example"}"#).unwrap();
        assert_eq!(user.email.as_deref(), Some("a@b.example"));
        assert_eq!(user.id, None);
    }

    #[test]
    fn test_session_status_accessors() {
        let status = SessionStatus::Authenticated(HostUser::default());
        assert!(status.is_authenticated());
        assert!(status.user().is_some());
        assert!(SessionStatus::Unauthenticated.user().is_none());
    }

    #[test]
    fn test_client_urls_follow_config() {
        let config = HostConfig {
            backend_url: "https://api.example.com".to_string(),
            ..Default::default()
        };
        let client = SessionClient::new(&config).unwrap();
        assert_eq!(client.session_url, "https://api.example.com/auth/user");
        assert_eq!(client.logout_url, "https://api.example.com/auth/logout");
        assert!(!format!("{:?}", client.with_session_cookie("s=1")).contains("s=1"));
    }
}
