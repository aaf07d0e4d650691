//! Error recovery middleware.
//!
//! Wraps the rest of the chain and hands any error it produces to a
//! closure, which may turn it into a reply or return an error of its own.
//! This is the only place errors are converted into successful responses;
//! the engine itself never recovers.
//!
//! # Example
//!
//! ```
//! use apex_core::{HandlerError, Reply};
//! use apex_middleware::stages::RecoverMiddleware;
//! use http::StatusCode;
//! use serde_json::json;
//!
//! // Serve a fallback body when an upstream dependency is down.
//! let fallback = RecoverMiddleware::new(|err: HandlerError| {
//!     if err.status() == StatusCode::SERVICE_UNAVAILABLE {
//!         Ok(Reply::json(json!({"items": [], "stale": true})))
//!     } else {
//!         Err(err)
//!     }
//! });
//! ```

use crate::middleware::{BoxFuture, Middleware, MiddlewareKind, Next};
use apex_core::{HandlerError, HandlerResult, Invocation, Reply};

/// Converts errors from the rest of the chain through a closure.
pub struct RecoverMiddleware<F> {
    recover: F,
}

impl<F> RecoverMiddleware<F>
where
    F: Fn(HandlerError) -> HandlerResult<Reply> + Send + Sync + 'static,
{
    /// Creates the middleware.
    pub const fn new(recover: F) -> Self {
        Self { recover }
    }
}

impl<F> Middleware for RecoverMiddleware<F>
where
    F: Fn(HandlerError) -> HandlerResult<Reply> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "recover"
    }

    fn kind(&self) -> MiddlewareKind {
        MiddlewareKind::ErrorHandler
    }

    fn process<'a>(&'a self, inv: Invocation, next: Next<'a>) -> BoxFuture<'a, HandlerResult<Reply>> {
        Box::pin(async move {
            let request_id = inv.request_id;
            match next.run(inv).await {
                Ok(reply) => Ok(reply),
                Err(err) => {
                    tracing::debug!(
                        request_id = %request_id,
                        status = err.status().as_u16(),
                        "recovering error"
                    );
                    (self.recover)(err)
                }
            }
        })
    }
}
