//! Configuration sections.

use apex_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

/// HTTP host settings.
///
/// # Example
///
/// ```
/// use apex_config::ServerSection;
///
/// let server = ServerSection {
///     http_addr: "127.0.0.1:8080".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(server.base_path, "/");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Bind address (e.g. "0.0.0.0:3000").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Prefix stripped from request paths.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Largest accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            base_path: default_base_path(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_base_path() -> String {
    "/".to_string()
}

const fn default_shutdown_timeout() -> u64 {
    30
}

const fn default_request_timeout() -> u64 {
    30_000
}

const fn default_max_body_bytes() -> u64 {
    1024 * 1024
}

/// Dispatcher behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DispatchSection {
    /// Check handler results against declared output schemas.
    #[serde(default = "default_true")]
    pub validate_output: bool,

    /// Send messages of unexpected errors to clients.
    #[serde(default)]
    pub expose_internal_errors: bool,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            validate_output: true,
            expose_internal_errors: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Filter directive, `RUST_LOG` syntax.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Service name written at startup.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Include module paths in log lines.
    #[serde(default = "default_true")]
    pub include_target: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Json,
            service_name: default_service_name(),
            include_target: true,
        }
    }
}

impl LoggingSection {
    /// The equivalent [`LogConfig`].
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level.clone(),
            format: self.format,
            service_name: self.service_name.clone(),
            include_target: self.include_target,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "apex".to_string()
}
