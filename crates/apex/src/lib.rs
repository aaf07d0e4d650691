//! # Apex
//!
//! Typed HTTP routing: routes carry their own input, output and path
//! parameter schemas, middleware chains compose immutably, and controllers
//! nest under path prefixes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use apex::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let users = controller("/user").routes([(
//!         "get",
//!         get("/:id")
//!             .output(Schema::object([("id", Schema::string()), ("name", Schema::string())]))
//!             .handler(|args: HandlerArgs| async move {
//!                 HandlerResult::Ok(serde_json::json!({ "id": args.param("id"), "name": "John Doe" }))
//!             })?,
//!     )])?;
//!
//!     let config = ApexConfig::development();
//!     let dispatcher = apex::dispatcher(&config).build(users)?;
//!     apex::serve(dispatcher, &config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! Host → Dispatcher → controller chains (root → leaf) → route chain
//!      → params/input validation → handler → output validation → Reply
//! ```

#![doc(html_root_url = "https://docs.rs/apex/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::time::Duration;

use apex_config::ApexConfig;
use apex_server::{DispatchOptions, Dispatcher, DispatcherBuilder, Server, ServerConfig, Shutdown};
use thiserror::Error;

pub use apex_config as config;
pub use apex_core as core;
pub use apex_middleware as middleware;
pub use apex_router as router;
pub use apex_server as server;
pub use apex_telemetry as telemetry;

/// Errors from [`serve`].
#[derive(Debug, Error)]
pub enum ServeError {
    /// Logging could not be set up.
    #[error(transparent)]
    Telemetry(#[from] apex_telemetry::TelemetryError),

    /// The server failed to bind or stopped with an error.
    #[error(transparent)]
    Server(#[from] apex_server::ServerError),
}

/// The host settings of `config`.
pub fn server_config(config: &ApexConfig) -> ServerConfig {
    let server = &config.server;
    ServerConfig::builder()
        .http_addr(&server.http_addr)
        .base_path(&server.base_path)
        .shutdown_timeout(Duration::from_secs(server.shutdown_timeout_secs))
        .request_timeout(Duration::from_millis(server.request_timeout_ms))
        .max_body_bytes(usize::try_from(server.max_body_bytes).unwrap_or(usize::MAX))
        .build()
}

/// The dispatcher switches of `config`.
pub fn dispatch_options(config: &ApexConfig) -> DispatchOptions {
    DispatchOptions {
        validate_output: config.dispatch.validate_output,
        expose_internal_errors: config.dispatch.expose_internal_errors,
    }
}

/// A dispatcher builder preset with the options of `config`.
pub fn dispatcher(config: &ApexConfig) -> DispatcherBuilder {
    Dispatcher::builder().options(dispatch_options(config))
}

/// Installs logging from `config`. A subscriber installed earlier is kept.
///
/// # Errors
///
/// Returns an error if the configured level does not parse.
pub fn init_logging(config: &ApexConfig) -> Result<(), apex_telemetry::TelemetryError> {
    apex_telemetry::create_env_filter(&config.logging.level)?;
    match apex_telemetry::init_logging(&config.logging.to_log_config()) {
        Err(apex_telemetry::TelemetryError::LoggingInit(reason)) => {
            tracing::debug!(%reason, "Keeping the existing subscriber");
            Ok(())
        }
        other => other,
    }
}

/// Sets up logging and serves `dispatcher` until SIGTERM or SIGINT.
///
/// # Errors
///
/// Returns an error if logging cannot be set up or the address cannot be
/// bound.
pub async fn serve(dispatcher: Dispatcher, config: &ApexConfig) -> Result<(), ServeError> {
    serve_with_shutdown(dispatcher, config, Shutdown::with_os_signals()).await
}

/// Like [`serve`], stopping when `shutdown` fires.
///
/// # Errors
///
/// Returns an error if logging cannot be set up or the address cannot be
/// bound.
pub async fn serve_with_shutdown(
    dispatcher: Dispatcher,
    config: &ApexConfig,
    shutdown: Shutdown,
) -> Result<(), ServeError> {
    init_logging(config)?;

    for (name, method, path) in dispatcher.routes() {
        tracing::info!(
            route = name,
            method = method.map_or("*", |m| m.as_str()),
            path = %path,
            "Route registered"
        );
    }

    Server::new(dispatcher, server_config(config))
        .run_with_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Prelude module for convenient imports.
///
/// ```rust
/// use apex::prelude::*;
///
/// let route = post("/").input(Schema::object([("name", Schema::string())]));
/// ```
pub mod prelude {
    pub use apex_config::{ApexConfig, ConfigLoader};
    pub use apex_core::{
        ApexError, ApiKeyLocation, Body, Context, ContextPatch, ErrorCode, HandlerError,
        HandlerResult, Invocation, Meta, Models, Reply, Request, RequestId, Schema,
        SecurityScheme, SecuritySchemes, Signal, Validator,
    };
    pub use apex_middleware::{BoxFuture, Chain, FnMiddleware, Middleware, MiddlewareKind, Next};
    pub use apex_server::{
        all, controller, delete, get, patch, post, put, route, BuildError, Controller,
        Dispatcher, HandlerArgs, Route, RouteNode, Server, ServerConfig, Shutdown,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_mapping() {
        let mut config = ApexConfig::default();
        config.server.base_path = "/api/".to_string();
        config.server.request_timeout_ms = 250;
        config.server.max_body_bytes = 64;

        let server = server_config(&config);
        assert_eq!(server.base_path(), "/api");
        assert_eq!(server.request_timeout(), Duration::from_millis(250));
        assert_eq!(server.max_body_bytes(), 64);
        assert_eq!(server.http_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_dispatch_options_mapping() {
        let options = dispatch_options(&ApexConfig::development());
        assert!(options.validate_output);
        assert!(options.expose_internal_errors);

        assert_eq!(dispatch_options(&ApexConfig::default()), DispatchOptions::default());
    }

    #[test]
    fn test_init_logging_twice_is_ok() {
        let config = ApexConfig::default();
        init_logging(&config).unwrap();
        init_logging(&config).unwrap();
    }

    #[test]
    fn test_init_logging_bad_level() {
        let mut config = ApexConfig::default();
        config.logging.level = "apex=loud".to_string();
        assert!(init_logging(&config).is_err());
    }
}
