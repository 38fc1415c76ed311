//! Host configuration: JSON file, defaults and environment overrides.

use crate::{ConfigError, ConfigResult, Paths};
use ott_handshake::{normalize_origin, SessionConfig, WidgetEndpoint};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Widget identifier used when none is configured.
pub const DEFAULT_WIDGET_ID: &str = "gtdave";
/// Widget frame URL used when none is configured.
pub const DEFAULT_WIDGET_URL: &str = "http://localhost:5174/?model_id=gtdave";
/// Origin of the host page.
pub const DEFAULT_HOST_ORIGIN: &str = "http://localhost:5173";
/// Host backend base URL (session and token endpoints).
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

const DEFAULT_SETTLE_DELAY_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Widget host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Model identifier sent to the token issuer.
    pub widget_id: String,
    /// Full frame URL. The widget origin is derived from it.
    pub widget_url: String,
    /// Origin the host page is served from.
    pub host_origin: String,
    /// Host backend base URL.
    pub backend_url: String,
    /// Delay between the frame's load event and the token request.
    pub settle_delay_ms: u64,
    /// Token request timeout.
    pub request_timeout_secs: u64,
    /// Token requests per frame, initial request included.
    pub max_attempts: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            widget_id: DEFAULT_WIDGET_ID.to_string(),
            widget_url: DEFAULT_WIDGET_URL.to_string(),
            host_origin: DEFAULT_HOST_ORIGIN.to_string(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl HostConfig {
    /// Defaults with environment overrides applied.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load from the default location (`~/.widget-host/config.json`).
    pub fn load_default() -> ConfigResult<Self> {
        let paths = Paths::new()?;
        Self::load(&paths.config_file())
    }

    /// Load from `path` if it exists, otherwise start from defaults, then
    /// apply environment overrides.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file, without overrides.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HostConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the default location under `paths`.
    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = get("WIDGET_HOST_LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = get("WIDGET_URL") {
            self.widget_url = value;
        }
        if let Some(value) = get("WIDGET_MODEL_ID") {
            self.widget_id = value;
        }
        if let Some(value) = get("WIDGET_HOST_ORIGIN") {
            self.host_origin = value;
        }
        if let Some(value) = get("WIDGET_BACKEND_URL") {
            self.backend_url = value;
        }
    }

    /// Reject configuration the handshake cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        self.endpoint()?;
        self.normalized_host_origin()?;
        self.backend_base()?;

        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The widget endpoint derived from `widget_id` and `widget_url`.
    pub fn endpoint(&self) -> ConfigResult<WidgetEndpoint> {
        Ok(WidgetEndpoint::new(
            self.widget_id.clone(),
            &self.widget_url,
        )?)
    }

    /// `host_origin` in serialized origin form.
    pub fn normalized_host_origin(&self) -> ConfigResult<String> {
        Ok(normalize_origin(&self.host_origin)?)
    }

    fn backend_base(&self) -> ConfigResult<String> {
        let url = Url::parse(self.backend_url.trim())?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "backend_url has unsupported scheme: {}",
                    other
                )))
            }
        }
        Ok(self.backend_url.trim().trim_end_matches('/').to_string())
    }

    fn backend_path(&self, path: &str) -> ConfigResult<String> {
        Ok(format!("{}{}", self.backend_base()?, path))
    }

    /// `{backend_url}/widget/get-ott`
    pub fn token_issuer_url(&self) -> ConfigResult<String> {
        self.backend_path("/widget/get-ott")
    }

    /// `{backend_url}/auth/user`
    pub fn session_url(&self) -> ConfigResult<String> {
        self.backend_path("/auth/user")
    }

    /// `{backend_url}/auth/login`
    pub fn login_url(&self) -> ConfigResult<String> {
        self.backend_path("/auth/login")
    }

    /// `{backend_url}/auth/logout`
    pub fn logout_url(&self) -> ConfigResult<String> {
        self.backend_path("/auth/logout")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = HostConfig::default();
        config.validate().unwrap();
        assert_eq!(config.endpoint().unwrap().origin(), "http://localhost:5174");
        assert_eq!(config.session_config(), SessionConfig::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_backend_urls() {
        let config = HostConfig {
            backend_url: "https://api.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.token_issuer_url().unwrap(),
            "https://api.example.com/widget/get-ott"
        );
        assert_eq!(
            config.session_url().unwrap(),
            "https://api.example.com/auth/user"
        );
        assert_eq!(
            config.login_url().unwrap(),
            "https://api.example.com/auth/login"
        );
        assert_eq!(
            config.logout_url().unwrap(),
            "https://api.example.com/auth/logout"
        );
    }

    #[test]
    fn test_load_from_file_with_partial_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "widget_url": "https://widget.example.com/embed", "max_attempts": 5 }"#,
        )
        .unwrap();

        let config = HostConfig::load_from_file(&path).unwrap();
        assert_eq!(config.widget_url, "https://widget.example.com/embed");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.widget_id, DEFAULT_WIDGET_ID);
        assert_eq!(config.settle_delay_ms, 500);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested"));

        let config = HostConfig {
            log_level: "trace".to_string(),
            ..Default::default()
        };
        config.save(&paths).unwrap();

        let loaded = HostConfig::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = HostConfig::load(&dir.path().join("missing.json")).unwrap();
        assert_eq!(config.settle_delay_ms, 500);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            HostConfig::load_from_file(&path),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("WIDGET_HOST_LOG_LEVEL", "debug"),
            ("WIDGET_URL", "https://widget.example.com/?model_id=m2"),
            ("WIDGET_MODEL_ID", "m2"),
            ("WIDGET_HOST_ORIGIN", "https://app.example.com"),
            ("WIDGET_BACKEND_URL", "   "),
        ]);

        let mut config = HostConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.widget_id, "m2");
        assert_eq!(config.widget_url, "https://widget.example.com/?model_id=m2");
        assert_eq!(config.host_origin, "https://app.example.com");
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            HostConfig {
                widget_id: " ".to_string(),
                ..Default::default()
            },
            HostConfig {
                widget_url: "widget.example.com".to_string(),
                ..Default::default()
            },
            HostConfig {
                widget_url: "ftp://widget.example.com/".to_string(),
                ..Default::default()
            },
            HostConfig {
                host_origin: "http://localhost:5173/home".to_string(),
                ..Default::default()
            },
            HostConfig {
                backend_url: "not a url".to_string(),
                ..Default::default()
            },
            HostConfig {
                max_attempts: 0,
                ..Default::default()
            },
            HostConfig {
                request_timeout_secs: 0,
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(config.validate().is_err(), "{config:?} should be invalid");
        }
    }

    #[test]
    fn test_normalized_host_origin_strips_trailing_slash() {
        let config = HostConfig {
            host_origin: "https://app.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.normalized_host_origin().unwrap(),
            "https://app.example.com"
        );
    }
}
