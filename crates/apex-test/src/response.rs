//! Test response with assertion helpers.

use std::fmt;

use apex_core::{ErrorCode, Reply};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TestError;

/// A response captured by [`TestClient`](crate::TestClient).
#[derive(Clone)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestResponse {
    /// Creates a response from its parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub(crate) fn from_reply(reply: Reply) -> Self {
        Self::new(reply.status, reply.headers, reply.body)
    }

    /// Builds a response from raw HTTP parts; an empty body is `null`.
    pub(crate) fn from_bytes(status: StatusCode, headers: HeaderMap, body: &Bytes) -> Result<Self, TestError> {
        let body = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(body)?
        };
        Ok(Self::new(status, headers, body))
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns true if the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns all headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header as a string.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Returns the `x-request-id` header.
    pub fn request_id(&self) -> Option<&str> {
        self.header(apex_server::REQUEST_ID_HEADER)
    }

    /// Returns the JSON body.
    pub fn json(&self) -> &Value {
        &self.body
    }

    /// Deserializes the JSON body.
    ///
    /// # Errors
    ///
    /// Returns `TestError::Json` if the body does not have the shape of `T`.
    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(T::deserialize(&self.body)?)
    }

    /// Returns `error.code` of an error envelope.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.body
            .pointer("/error/code")
            .and_then(Value::as_str)
            .and_then(|code| code.parse().ok())
    }

    /// Returns `error.message` of an error envelope.
    pub fn error_message(&self) -> Option<&str> {
        self.body.pointer("/error/message").and_then(Value::as_str)
    }

    /// Asserts that the status code equals the expected value.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match.
    #[track_caller]
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "Expected status {}, got {} with body {}",
            expected, self.status, self.body
        );
        self
    }

    /// Asserts that a header exists with the expected value.
    ///
    /// # Panics
    ///
    /// Panics if the header doesn't exist or doesn't match.
    #[track_caller]
    pub fn assert_header(&self, name: impl AsRef<str>, expected: impl AsRef<str>) -> &Self {
        let name = name.as_ref();
        let expected = expected.as_ref();
        let actual = self
            .header(name)
            .unwrap_or_else(|| panic!("Header '{}' not found", name));
        assert_eq!(
            actual, expected,
            "Header '{}': expected '{}', got '{}'",
            name, expected, actual
        );
        self
    }

    /// Asserts that the JSON body equals the expected value.
    ///
    /// # Panics
    ///
    /// Panics if the JSON doesn't match.
    #[track_caller]
    pub fn assert_json(&self, expected: &Value) -> &Self {
        assert_eq!(&self.body, expected, "JSON body mismatch");
        self
    }

    /// Asserts that the value at a JSON pointer (`/error/code`) equals the
    /// expected value.
    ///
    /// # Panics
    ///
    /// Panics if the pointer doesn't resolve or the value doesn't match.
    #[track_caller]
    pub fn assert_json_field(&self, pointer: &str, expected: &Value) -> &Self {
        let actual = self.body.pointer(pointer).unwrap_or_else(|| {
            panic!("JSON pointer '{}' not found in: {}", pointer, self.body);
        });
        assert_eq!(
            actual, expected,
            "JSON field '{}': expected {}, got {}",
            pointer, expected, actual
        );
        self
    }

    /// Asserts that the body is an error envelope with `code`.
    ///
    /// # Panics
    ///
    /// Panics if the status or code doesn't match.
    #[track_caller]
    pub fn assert_error(&self, code: ErrorCode) -> &Self {
        self.assert_status(code.status());
        assert_eq!(self.error_code(), Some(code), "error code mismatch in {}", self.body);
        self
    }
}

impl fmt::Debug for TestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}
