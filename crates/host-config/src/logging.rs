//! Logging initialization for the widget host.
//!
//! All host binaries go through [`init_logging`]: compact logs on stderr, plus
//! structured JSONL under `~/.widget-host/logs/` (or `WIDGET_HOST_LOG_FILE`).

use crate::Paths;
use observability::LogConfig;
use std::path::PathBuf;

const SERVICE_NAME: &str = "widget-host";

/// Initialize the logging system.
///
/// `level` is the default filter; `RUST_LOG` takes precedence when set.
pub fn init_logging(level: &str, paths: &Paths) {
    let log_path = resolve_log_path(std::env::var("WIDGET_HOST_LOG_FILE").ok(), paths);

    observability::init_with_config(LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        log_path: Some(log_path),
        also_stderr: true,
    });
}

/// The JSONL log file: the override when non-empty, else `paths.log_file()`.
pub fn resolve_log_path(override_path: Option<String>, paths: &Paths) -> PathBuf {
    override_path
        .and_then(non_empty_env)
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.log_file())
}

fn non_empty_env(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    observability::parse_level(level)
}
