//! The value a middleware unit and a handler receive.
//!
//! An [`Invocation`] bundles the per-request context with everything known
//! about the matched route: captured path parameters, coerced query, raw
//! input, static route metadata and the cooperative cancellation signal.

use crate::context::{Context, ContextPatch, RequestId};
use crate::security::{ApiKeyLocation, SecurityScheme, SecuritySchemes};
use apex_router::Params;
use http::{HeaderMap, Method};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Static route metadata.
///
/// Set once on a route and shared, read-only, by every request that hits
/// it. Typical content is flags for middleware, e.g. `{"auth": true}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta(Arc<Value>);

impl Meta {
    /// Wraps a JSON value.
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    /// Returns the whole metadata value (`null` when unset).
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Returns the metadata field `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns true if `key` is set to `true`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// True when no metadata was attached.
    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}

impl From<Value> for Meta {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Cooperative cancellation signal.
///
/// The host cancels it when the client goes away or the server shuts down.
/// The dispatcher never aborts a running handler; handlers and middleware
/// observe the signal and stop on their own.
#[derive(Debug, Clone, Default)]
pub struct Signal(CancellationToken);

impl Signal {
    /// Creates a fresh, uncancelled signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self(token)
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Completes when cancellation is requested.
    pub async fn cancelled(&self) {
        self.0.cancelled().await;
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// A signal cancelled together with this one, but cancellable alone.
    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.0
    }
}

/// Everything a middleware unit sees about the current request.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Request identifier.
    pub request_id: RequestId,
    /// HTTP method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Accumulated context.
    pub ctx: Context,
    /// Request body before input validation.
    pub input: Value,
    /// Captured path parameters.
    pub params: Params,
    /// Query values converted per the route's declaration.
    pub query: Map<String, Value>,
    /// Route metadata.
    pub meta: Meta,
    /// Cancellation signal.
    pub signal: Signal,
    /// Authentication schemes declared on the dispatcher.
    pub schemes: SecuritySchemes,
}

impl Invocation {
    /// Creates an invocation with only a context and input, as used for
    /// direct programmatic calls.
    pub fn new(ctx: Context, input: Value) -> Self {
        Self {
            request_id: RequestId::new(),
            method: Method::GET,
            path: "/".to_string(),
            headers: HeaderMap::new(),
            ctx,
            input,
            params: Params::new(),
            query: Map::new(),
            meta: Meta::default(),
            signal: Signal::new(),
            schemes: SecuritySchemes::new(),
        }
    }

    /// Sets the path parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Sets the cancellation signal.
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    /// Sets the declared authentication schemes.
    pub fn with_schemes(mut self, schemes: SecuritySchemes) -> Self {
        self.schemes = schemes;
        self
    }

    /// The raw credential the request carries for the declared scheme
    /// `name`, read from wherever that scheme puts it.
    ///
    /// HTTP schemes yield the `Authorization` value with the scheme prefix
    /// removed. Undeclared names and OAuth2 schemes yield `None`.
    pub fn credential(&self, name: &str) -> Option<String> {
        match self.schemes.get(name)? {
            SecurityScheme::ApiKey { name: key, location, .. } => match location {
                ApiKeyLocation::Header => self.header(key).map(str::to_string),
                ApiKeyLocation::Query => self.query.get(key).map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
                ApiKeyLocation::Cookie => self.cookie(key).map(str::to_string),
            },
            SecurityScheme::Http { scheme, .. } => {
                let value = self.header("authorization")?;
                let (prefix, rest) = value.split_once(' ')?;
                prefix.eq_ignore_ascii_case(scheme).then(|| rest.trim().to_string())
            }
            SecurityScheme::OAuth2 { .. } => None,
        }
    }

    /// Returns a cookie value from the `Cookie` headers.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find_map(|(k, v)| (k == name).then_some(v))
    }

    /// Merges a patch into the context.
    pub fn patch(&mut self, patch: ContextPatch) {
        self.ctx.merge(patch);
    }

    /// Returns a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
