//! Configuration, paths and logging for the widget host.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    HostConfig, DEFAULT_BACKEND_URL, DEFAULT_HOST_ORIGIN, DEFAULT_LOG_LEVEL, DEFAULT_WIDGET_ID,
    DEFAULT_WIDGET_URL,
};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level, resolve_log_path};
pub use paths::Paths;
