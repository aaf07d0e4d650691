//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that every unit of a
//! [`Chain`](crate::Chain) implements, and the [`Next`] continuation a unit
//! calls to hand control to the rest of the chain.
//!
//! A unit may:
//!
//! - call [`Next::run`] (or [`Next::run_with`] to add to the context first),
//! - return its own [`Reply`] without calling `next`, short-circuiting the
//!   rest of the chain and the handler,
//! - return an error, which likewise stops the chain.
//!
//! Only a unit that wraps `next` may turn an error from further down into a
//! reply; nothing else recovers errors.
//!
//! # Example
//!
//! ```
//! use apex_core::{ContextPatch, HandlerResult, Invocation, Reply};
//! use apex_middleware::{BoxFuture, Middleware, Next};
//! use serde_json::json;
//!
//! struct Tenant;
//!
//! impl Middleware for Tenant {
//!     fn name(&self) -> &'static str {
//!         "tenant"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         inv: Invocation,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, HandlerResult<Reply>> {
//!         Box::pin(async move {
//!             let tenant = inv.header("x-tenant").unwrap_or("public").to_string();
//!             next.run_with(inv, ContextPatch::new().set("tenant", json!(tenant)))
//!                 .await
//!         })
//!     }
//! }
//! ```

use crate::chain::Chain;
use apex_core::{ContextPatch, HandlerResult, Invocation, Reply};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future that returns a response.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a middleware unit is for.
///
/// Used for introspection and ordering diagnostics only; the engine runs
/// every kind the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MiddlewareKind {
    /// Authentication and access checks; expected first in a chain.
    Security,
    /// General purpose.
    #[default]
    Layer,
    /// Decodes or normalizes input.
    Parser,
    /// Converts errors from the rest of the chain into replies.
    ErrorHandler,
    /// Shapes the outgoing reply.
    Serializer,
}

impl fmt::Display for MiddlewareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Security => "security",
            Self::Layer => "layer",
            Self::Parser => "parser",
            Self::ErrorHandler => "error_handler",
            Self::Serializer => "serializer",
        })
    }
}

/// A unit of a middleware chain.
///
/// # Invariants
///
/// - Call `next.run()` at most once; not calling it short-circuits
/// - Never drop an error from `next` silently; either return it or turn it
///   into an explicit reply
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this unit, used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Returns the kind of this unit.
    fn kind(&self) -> MiddlewareKind {
        MiddlewareKind::Layer
    }

    /// Processes the invocation.
    fn process<'a>(&'a self, inv: Invocation, next: Next<'a>) -> BoxFuture<'a, HandlerResult<Reply>>;
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn kind(&self) -> MiddlewareKind {
        (**self).kind()
    }

    fn process<'a>(&'a self, inv: Invocation, next: Next<'a>) -> BoxFuture<'a, HandlerResult<Reply>> {
        (**self).process(inv, next)
    }
}

/// The innermost step of a chain: what runs once every unit has called
/// `next`.
///
/// The dispatcher supplies one per route: input validation, the handler
/// and output validation.
pub trait Endpoint: Send + Sync {
    /// Runs the endpoint.
    fn call(&self, inv: Invocation) -> BoxFuture<'_, HandlerResult<Reply>>;
}

/// Continuation handed to each middleware unit.
///
/// Consumed by [`Next::run`], so it can be invoked at most once.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    /// Starts executing `chain`, ending at `endpoint`.
    pub fn start(chain: &'a Chain, endpoint: &'a dyn Endpoint) -> Self {
        Self {
            remaining: chain.units(),
            endpoint,
        }
    }

    /// Number of units still to run before the endpoint.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Invokes the next unit, or the endpoint if the chain is exhausted.
    pub async fn run(self, inv: Invocation) -> HandlerResult<Reply> {
        match self.remaining.split_first() {
            Some((unit, rest)) => {
                let next = Next {
                    remaining: rest,
                    endpoint: self.endpoint,
                };
                unit.process(inv, next).await
            }
            None => self.endpoint.call(inv).await,
        }
    }

    /// Merges `patch` into the context, then continues.
    pub async fn run_with(self, mut inv: Invocation, patch: ContextPatch) -> HandlerResult<Reply> {
        inv.ctx.merge(patch);
        self.run(inv).await
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.remaining.len())
            .finish_non_exhaustive()
    }
}

/// A middleware built from a closure.
///
/// # Example
///
/// ```
/// use apex_core::ApexError;
/// use apex_middleware::{FnMiddleware, MiddlewareKind};
///
/// let guard = FnMiddleware::new("api-key", |inv, next| {
///     Box::pin(async move {
///         if inv.header("x-api-key").is_none() {
///             return Err(ApexError::unauthorized("missing api key").into());
///         }
///         next.run(inv).await
///     })
/// })
/// .with_kind(MiddlewareKind::Security);
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    kind: MiddlewareKind,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(Invocation, Next<'a>) -> BoxFuture<'a, HandlerResult<Reply>>
        + Send
        + Sync
        + 'static,
{
    /// Creates a new function-based middleware of kind [`MiddlewareKind::Layer`].
    pub const fn new(name: &'static str, func: F) -> Self {
        Self {
            name,
            kind: MiddlewareKind::Layer,
            func,
        }
    }

    /// Sets the kind reported for diagnostics.
    pub fn with_kind(mut self, kind: MiddlewareKind) -> Self {
        self.kind = kind;
        self
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(Invocation, Next<'a>) -> BoxFuture<'a, HandlerResult<Reply>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> MiddlewareKind {
        self.kind
    }

    fn process<'a>(&'a self, inv: Invocation, next: Next<'a>) -> BoxFuture<'a, HandlerResult<Reply>> {
        (self.func)(inv, next)
    }
}
