//! # Observability
//!
//! Structured logging for the widget host workspace.
//!
//! Crates are **log producers** only. They call `observability::init()` (or
//! `init_with_config`) once at startup and use the standard `tracing` macros
//! everywhere else. Where the lines end up is decided here:
//!
//! - a compact human-readable layer on stderr
//! - an optional JSONL file layer, one object per event
//!
//! Every field that looks like a credential (`ott`, `token`, `cookie`,
//! `authorization`, ...) is redacted before it reaches the file layer.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "widget-host".into(),
//!     default_level: "debug".into(),
//!     log_path: Some("/tmp/widget-host.jsonl".into()),
//!     also_stderr: true,
//! });
//! tracing::info!(widget_id = "gtdave", "host ready");
//! ```

mod json_layer;
mod redact;
mod writer;

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub use json_layer::{JsonLayer, LogEntry};
pub use redact::{is_sensitive_key, sanitize_value, REDACTED};
pub use writer::LogFileWriter;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Overridden by `RUST_LOG` when set.
    pub default_level: String,

    /// Optional JSONL log file. When absent only stderr is used.
    pub log_path: Option<PathBuf>,

    /// Emit compact logs on stderr in addition to the file.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize logging with default settings for the given service.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with a custom configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
/// A log file that cannot be opened degrades to stderr-only output.
pub fn init_with_config(config: LogConfig) {
    let mut open_error = None;

    let file_layer = match &config.log_path {
        Some(path) => match LogFileWriter::open(path) {
            Ok(writer) => Some(JsonLayer::new(config.service_name.clone(), writer)),
            Err(err) => {
                open_error = Some((path.clone(), err));
                None
            }
        },
        None => None,
    };

    let stderr_layer = if config.also_stderr || file_layer.is_none() {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(io::stderr),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter(&config.default_level))
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if let Some((path, err)) = open_error {
        tracing::warn!(
            log_path = %path.display(),
            error = %err,
            "failed to open log file, logging to stderr only"
        );
    }

    if installed {
        tracing::debug!(service = %config.service_name, "observability initialized");
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Parse a log level string into a tracing Level. Unknown values map to INFO.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

pub use tracing::{debug, error, info, instrument, trace, warn, Level};
