//! The root configuration type.

use std::net::SocketAddr;

use apex_telemetry::LogFormat;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, DispatchSection, LoggingSection, ServerSection};

/// Complete Apex configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to layer files and
/// environment variables over these values.
///
/// # Example
///
/// ```
/// use apex_config::ApexConfig;
///
/// let config = ApexConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:3000");
/// assert!(config.dispatch.validate_output);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ApexConfig {
    /// HTTP host settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Dispatcher behavior.
    #[serde(default)]
    pub dispatch: DispatchSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ApexConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid(
                "server.http_addr",
                format!("`{}` is not a socket address", server.http_addr),
            ));
        }
        if !server.base_path.starts_with('/') {
            return Err(ConfigError::invalid("server.base_path", "must start with '/'"));
        }
        if server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid("server.request_timeout_ms", "must be positive"));
        }
        if server.max_body_bytes == 0 {
            return Err(ConfigError::invalid("server.max_body_bytes", "must be positive"));
        }

        apex_telemetry::create_env_filter(&self.logging.level)
            .map_err(|e| ConfigError::invalid("logging.level", e.to_string()))?;

        Ok(())
    }

    /// Development preset: readable debug logs, internal error messages
    /// sent to clients.
    ///
    /// ```
    /// use apex_config::ApexConfig;
    ///
    /// let config = ApexConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// assert!(config.dispatch.expose_internal_errors);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.dispatch.expose_internal_errors = true;

        config
    }

    /// Production preset: JSON logs at info, internal errors hidden,
    /// output validation on.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.dispatch.expose_internal_errors = false;
        config.dispatch.validate_output = true;

        config
    }
}
