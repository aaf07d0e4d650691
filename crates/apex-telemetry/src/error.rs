//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while setting up logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The level or filter directive could not be parsed.
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    /// The log format name is unknown.
    #[error("Unknown log format '{0}', expected json, pretty or compact")]
    UnknownFormat(String),

    /// A global subscriber was already installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),
}
