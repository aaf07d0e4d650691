//! Structured logging for Apex services.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and one of
//! three line formats. The dispatcher and host emit their events through
//! `tracing`; this crate only decides where and how they are written.
//!
//! # Example
//!
//! ```rust,no_run
//! use apex_telemetry::{init_logging, LogConfig, LogFormat};
//!
//! let config = LogConfig {
//!     format: LogFormat::Compact,
//!     ..LogConfig::production()
//! };
//! init_logging(&config).expect("logging");
//! ```

#![doc(html_root_url = "https://docs.rs/apex-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
