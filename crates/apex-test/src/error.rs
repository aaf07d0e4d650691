//! Test error types.

use thiserror::Error;

/// Errors that can occur while building a request or reading a response.
#[derive(Debug, Error)]
pub enum TestError {
    /// The HTTP request could not be assembled.
    #[error("Request build error: {0}")]
    RequestBuild(String),

    /// A header name or value is invalid.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
