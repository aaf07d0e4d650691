//! Structured logging.
//!
//! # Example
//!
//! ```rust,no_run
//! use apex_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(route = "user.get", "Processing request");
//! # Ok::<(), apex_telemetry::TelemetryError>(())
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line, human-readable.
    Pretty,
    /// Single-line, human-readable.
    Compact,
}

impl LogFormat {
    /// The lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            _ => Err(TelemetryError::UnknownFormat(s.to_string())),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive (e.g. `"info"`, `"apex_server=debug,info"`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,

    /// Line format.
    pub format: LogFormat,

    /// Service name attached to the startup event.
    pub service_name: String,

    /// Whether to include the target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            service_name: "apex".to_string(),
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Human-readable output at debug level.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            ..Self::default()
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Sets the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Builds the filter, preferring `RUST_LOG` over the configured level.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::InvalidFilter` if the configured level does
    /// not parse.
    pub fn env_filter(&self) -> TelemetryResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => create_env_filter(&self.level),
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` for a bad level and
/// `TelemetryError::LoggingInit` if a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.env_filter()?;

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(config.include_target);
    let layer = match config.format {
        LogFormat::Json => fmt_layer.json().with_filter(filter).boxed(),
        LogFormat::Pretty => fmt_layer.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => fmt_layer.compact().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        format = %config.format,
        "Logging initialized"
    );
    Ok(())
}

/// Parses a filter directive.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` if the directive is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter).map_err(|e| TelemetryError::InvalidFilter(e.to_string()))
}

/// Names of the structured fields the dispatcher and host emit, for
/// filtering and inspecting captured logs.
pub mod fields {
    /// Request id.
    pub const REQUEST_ID: &str = "request_id";

    /// HTTP method.
    pub const METHOD: &str = "method";

    /// Request path after base-path stripping.
    pub const PATH: &str = "path";

    /// Dotted route name (`user.get`).
    pub const ROUTE: &str = "route";

    /// Error code (`NOT_FOUND`).
    pub const CODE: &str = "code";

    /// Error message of an intentional error.
    pub const DETAIL: &str = "detail";

    /// Unexpected failure, with its cause chain.
    pub const ERROR: &str = "error";

    /// Response status.
    pub const STATUS: &str = "status";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
        assert!(config.include_target);
    }

    #[test]
    fn test_presets() {
        let dev = LogConfig::development();
        assert_eq!(dev.format, LogFormat::Pretty);
        assert_eq!(dev.level, "debug");

        assert_eq!(LogConfig::production(), LogConfig::default());
        assert_eq!(
            LogConfig::production().with_service_name("users").service_name,
            "users"
        );
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
    }

    #[test]
    fn test_format_serde() {
        let format: LogFormat = serde_json::from_str("\"compact\"").unwrap();
        assert_eq!(format, LogFormat::Compact);
        assert_eq!(serde_json::to_string(&LogFormat::Json).unwrap(), "\"json\"");
    }

    #[test]
    fn test_create_env_filter() {
        assert!(create_env_filter("info").is_ok());
        assert!(create_env_filter("apex_server=debug,warn").is_ok());
        assert!(matches!(
            create_env_filter("apex_server=loud"),
            Err(TelemetryError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_json_lines_carry_field_names() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(request_id = "r-1", code = "NOT_FOUND", detail = "gone", "request rejected");
        });

        let raw = String::from_utf8(capture.0.lock().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(raw.trim()).unwrap();
        assert_eq!(line["fields"][fields::REQUEST_ID], "r-1");
        assert_eq!(line["fields"][fields::CODE], "NOT_FOUND");
        assert_eq!(line["fields"][fields::DETAIL], "gone");
    }
}
