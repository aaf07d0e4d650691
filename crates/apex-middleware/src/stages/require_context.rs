//! Context key gate.
//!
//! Rejects a request with `401 UNAUTHORIZED` unless an earlier step (the
//! context factory or a preceding middleware) put a given key into the
//! context. Optionally only enforced on routes whose metadata sets a flag,
//! e.g. `{"auth": true}`.

use crate::middleware::{BoxFuture, Middleware, MiddlewareKind, Next};
use apex_core::{ApexError, ErrorCode, HandlerResult, Invocation, Reply};

/// Requires a context key to be present.
#[derive(Debug, Clone)]
pub struct RequireContextKey {
    key: String,
    code: ErrorCode,
    meta_flag: Option<String>,
}

impl RequireContextKey {
    /// Requires `key` on every request.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            code: ErrorCode::Unauthorized,
            meta_flag: None,
        }
    }

    /// Only enforce on routes whose metadata sets `flag` to `true`.
    #[must_use]
    pub fn when_meta_flag(mut self, flag: impl Into<String>) -> Self {
        self.meta_flag = Some(flag.into());
        self
    }

    /// Uses `code` instead of `UNAUTHORIZED` when the key is missing.
    #[must_use]
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    fn applies(&self, inv: &Invocation) -> bool {
        self.meta_flag
            .as_deref()
            .map_or(true, |flag| inv.meta.flag(flag))
    }
}

impl Middleware for RequireContextKey {
    fn name(&self) -> &'static str {
        "require_context_key"
    }

    fn kind(&self) -> MiddlewareKind {
        MiddlewareKind::Security
    }

    fn process<'a>(&'a self, inv: Invocation, next: Next<'a>) -> BoxFuture<'a, HandlerResult<Reply>> {
        Box::pin(async move {
            if self.applies(&inv) && !inv.ctx.contains(&self.key) {
                tracing::debug!(
                    request_id = %inv.request_id,
                    key = %self.key,
                    "required context key missing"
                );
                return Err(ApexError::new(self.code, format!("'{}' is required", self.key)).into());
            }
            next.run(inv).await
        })
    }
}
