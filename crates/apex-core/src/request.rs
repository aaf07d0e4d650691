//! Request and reply values exchanged with the host server.
//!
//! The host collaborator parses raw HTTP into a [`Request`]; the dispatcher
//! answers with a [`Reply`]. Neither type knows about sockets or bytes on
//! the wire beyond the optional raw body.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

/// A request body as produced by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No body was sent.
    #[default]
    Empty,
    /// An already-parsed JSON document.
    Json(Value),
    /// Unparsed bytes.
    Raw(Bytes),
}

impl Body {
    /// Returns the body as a JSON value.
    ///
    /// `Empty` becomes `null`; raw bytes are decoded as JSON when possible,
    /// otherwise as a UTF-8 string. Bytes that are neither become `null`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Json(value) => value.clone(),
            Self::Raw(bytes) if bytes.is_empty() => Value::Null,
            Self::Raw(bytes) => serde_json::from_slice(bytes).unwrap_or_else(|_| {
                std::str::from_utf8(bytes)
                    .map(|s| Value::String(s.to_string()))
                    .unwrap_or(Value::Null)
            }),
        }
    }

    /// True for [`Body::Empty`] or an empty raw buffer.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Raw(bytes) => bytes.is_empty(),
            Self::Json(_) => false,
        }
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Raw(bytes)
    }
}

/// A uniform request descriptor.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Request path without the query string.
    pub path: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Raw query pairs in arrival order.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub body: Body,
}

impl Request {
    /// Creates a request with no headers, query or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a query pair.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Returns a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// The terminal result of a middleware chain.
///
/// Produced by the route's handler (wrapped by the dispatcher) or directly
/// by a middleware that short-circuits.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// JSON response body.
    pub body: Value,
}

impl Reply {
    /// A 200 reply with `body`.
    pub fn json(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Serializes `body` into a 200 reply.
    pub fn from_serialize<T: Serialize>(body: &T) -> serde_json::Result<Self> {
        serde_json::to_value(body).map(Self::json)
    }

    /// A reply with no body (`null`) and the given status.
    pub fn empty(status: StatusCode) -> Self {
        Self::json(Value::Null).with_status(status)
    }

    /// Sets the status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets a header, replacing earlier values. Invalid names or values are
    /// ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }
}
