//! Layered configuration for Apex services.
//!
//! [`ApexConfig`] has three sections:
//!
//! - [`ServerSection`] - bind address, base path, timeouts, body limit
//! - [`DispatchSection`] - output validation, internal error exposure
//! - [`LoggingSection`] - level, format and service name
//!
//! Unknown fields are rejected everywhere.
//!
//! # Example
//!
//! ```no_run
//! use apex_config::ConfigLoader;
//!
//! # fn main() -> Result<(), apex_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_production()
//!     .with_file("apex.toml")?
//!     .with_env_prefix("APEX")
//!     .load()?;
//!
//! println!("Server will listen on: {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:3000"
//! base_path = "/api"
//! shutdown_timeout_secs = 30
//! request_timeout_ms = 30000
//! max_body_bytes = 1048576
//!
//! [dispatch]
//! validate_output = true
//! expose_internal_errors = false
//!
//! [logging]
//! level = "info"
//! format = "json"
//! service_name = "users"
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `APEX__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `APEX__DISPATCH__VALIDATE_OUTPUT=false`
//! - `APEX__LOGGING__LEVEL=debug`

#![doc(html_root_url = "https://docs.rs/apex-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::ApexConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{DispatchSection, LoggingSection, ServerSection};
