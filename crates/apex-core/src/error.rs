//! Error types for Apex.
//!
//! Two kinds of failure flow through a request:
//!
//! - [`ApexError`]: an intentional, status-bearing error raised by a
//!   middleware or handler (or by the framework itself, e.g. validation).
//!   Its code maps to an HTTP status through a fixed table and its message
//!   is sent to the client.
//! - Anything else: wrapped as [`HandlerError::Unexpected`], logged by the
//!   dispatcher and answered with a generic 500 that leaks no detail.
//!
//! Handlers and middleware return [`HandlerResult`], so both kinds can be
//! propagated with `?`.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Result type returned by handlers and middleware.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Machine-readable error codes with a fixed HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 405
    MethodNotAllowed,
    /// 406
    NotAcceptable,
    /// 409
    Conflict,
    /// 413
    PayloadTooLarge,
    /// 415
    UnsupportedMediaType,
    /// 418
    ImATeapot,
    /// 422
    UnprocessableEntity,
    /// 429
    TooManyRequests,
    /// 451
    UnavailableForLegalReasons,
    /// 500
    InternalServerError,
    /// 501
    NotImplemented,
    /// 502
    BadGateway,
    /// 503
    ServiceUnavailable,
    /// 504
    GatewayTimeout,
    /// 505
    HttpVersionNotSupported,
}

impl ErrorCode {
    /// Every code, in status order.
    pub const ALL: [ErrorCode; 19] = [
        Self::BadRequest,
        Self::Unauthorized,
        Self::Forbidden,
        Self::NotFound,
        Self::MethodNotAllowed,
        Self::NotAcceptable,
        Self::Conflict,
        Self::PayloadTooLarge,
        Self::UnsupportedMediaType,
        Self::ImATeapot,
        Self::UnprocessableEntity,
        Self::TooManyRequests,
        Self::UnavailableForLegalReasons,
        Self::InternalServerError,
        Self::NotImplemented,
        Self::BadGateway,
        Self::ServiceUnavailable,
        Self::GatewayTimeout,
        Self::HttpVersionNotSupported,
    ];

    /// Returns the HTTP status for this code.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::ImATeapot => StatusCode::IM_A_TEAPOT,
            Self::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::UnavailableForLegalReasons => StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            Self::BadGateway => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::HttpVersionNotSupported => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
        }
    }

    /// Returns the wire name, e.g. `"NOT_FOUND"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::NotAcceptable => "NOT_ACCEPTABLE",
            Self::Conflict => "CONFLICT",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            Self::ImATeapot => "IM_A_TEAPOT",
            Self::UnprocessableEntity => "UNPROCESSABLE_ENTITY",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::UnavailableForLegalReasons => "UNAVAILABLE_FOR_LEGAL_REASONS",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::BadGateway => "BAD_GATEWAY",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::GatewayTimeout => "GATEWAY_TIMEOUT",
            Self::HttpVersionNotSupported => "HTTP_VERSION_NOT_SUPPORTED",
        }
    }

    /// Returns the code whose status is `status`, if any.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.status() == status)
    }

    /// Default human-readable message, the canonical reason phrase.
    #[must_use]
    pub fn default_message(self) -> &'static str {
        self.status().canonical_reason().unwrap_or("Error")
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown error code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown error code '{0}'")]
pub struct UnknownErrorCode(pub String);

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownErrorCode(s.to_string()))
    }
}

/// An intentional, status-bearing error.
///
/// # Example
///
/// ```
/// use apex_core::{ApexError, ErrorCode};
///
/// let err = ApexError::unauthorized("Missing token")
///     .with_localized_description("Please sign in");
/// assert_eq!(err.code(), ErrorCode::Unauthorized);
/// assert_eq!(err.status().as_u16(), 401);
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct ApexError {
    code: ErrorCode,
    message: String,
    localized_description: String,
    data: Option<Value>,
}

impl ApexError {
    /// Creates an error with `code` and `message`.
    ///
    /// The localized description defaults to the message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code,
            localized_description: message.clone(),
            message,
            data: None,
        }
    }

    /// Creates an error using the code's default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// 401 Unauthorized.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// 403 Forbidden.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// 404 Not Found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// 405 Method Not Allowed.
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MethodNotAllowed, message)
    }

    /// 409 Conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// 422 Unprocessable Entity.
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnprocessableEntity, message)
    }

    /// 429 Too Many Requests.
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TooManyRequests, message)
    }

    /// 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }

    /// 501 Not Implemented.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotImplemented, message)
    }

    /// 503 Service Unavailable.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// 504 Gateway Timeout.
    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::GatewayTimeout, message)
    }

    /// Sets the client-facing localized description.
    pub fn with_localized_description(mut self, description: impl Into<String>) -> Self {
        self.localized_description = description.into();
        self
    }

    /// Attaches structured data sent alongside the error.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The error code.
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// The HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        self.code.status()
    }

    /// The message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The localized description.
    pub fn localized_description(&self) -> &str {
        &self.localized_description
    }

    /// Attached data, if any.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.code,
                message: self.message.clone(),
                localized_description: self.localized_description.clone(),
                data: self.data.clone(),
            },
            request_id: request_id.map(ToString::to_string),
        }
    }
}

impl From<ErrorCode> for ApexError {
    fn from(code: ErrorCode) -> Self {
        Self::from_code(code)
    }
}

/// Any failure raised by a middleware unit, handler or context factory.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// An intentional error carrying its own status.
    #[error(transparent)]
    Apex(#[from] ApexError),

    /// An unexpected failure; never shown to clients verbatim.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl HandlerError {
    /// Wraps any error as an unexpected failure.
    pub fn unexpected(err: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected(err.into())
    }

    /// Returns the HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Apex(err) => err.status(),
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the intentional error, if this is one.
    pub fn as_apex(&self) -> Option<&ApexError> {
        match self {
            Self::Apex(err) => Some(err),
            Self::Unexpected(_) => None,
        }
    }

    /// Converts to the error sent to the client.
    ///
    /// Unexpected failures become a generic 500; their message is only
    /// included when `expose_internal` is set.
    pub fn into_client_error(self, expose_internal: bool) -> ApexError {
        match self {
            Self::Apex(err) => err,
            Self::Unexpected(err) if expose_internal => {
                ApexError::internal(format!("{err:#}"))
            }
            Self::Unexpected(_) => ApexError::from_code(ErrorCode::InternalServerError),
        }
    }
}

impl From<ErrorCode> for HandlerError {
    fn from(code: ErrorCode) -> Self {
        Self::Apex(code.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unexpected(err.into())
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::Unexpected(err.into())
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Client-facing description.
    pub localized_description: String,
    /// Additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_table() {
        let expected = [
            (ErrorCode::BadRequest, 400),
            (ErrorCode::Unauthorized, 401),
            (ErrorCode::Forbidden, 403),
            (ErrorCode::NotFound, 404),
            (ErrorCode::MethodNotAllowed, 405),
            (ErrorCode::Conflict, 409),
            (ErrorCode::UnprocessableEntity, 422),
            (ErrorCode::TooManyRequests, 429),
            (ErrorCode::InternalServerError, 500),
            (ErrorCode::NotImplemented, 501),
            (ErrorCode::BadGateway, 502),
            (ErrorCode::ServiceUnavailable, 503),
            (ErrorCode::GatewayTimeout, 504),
        ];
        for (code, status) in expected {
            assert_eq!(code.status().as_u16(), status, "{code}");
        }
    }

    #[test]
    fn test_all_codes_are_error_statuses() {
        for code in ErrorCode::ALL {
            let status = code.status();
            assert!(status.is_client_error() || status.is_server_error());
            assert_eq!(ErrorCode::from_status(status), Some(code));
        }
    }

    #[test]
    fn test_code_wire_name_roundtrip() {
        for code in ErrorCode::ALL {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, json!(code.as_str()));
            assert_eq!(code.as_str().parse::<ErrorCode>().unwrap(), code);
        }
        assert!("NOPE".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn test_localized_description_defaults_to_message() {
        let err = ApexError::conflict("Already exists");
        assert_eq!(err.localized_description(), "Already exists");
        assert_eq!(err.to_string(), "CONFLICT: Already exists");
    }

    #[test]
    fn test_envelope_shape() {
        let err = ApexError::unauthorized("Bad token")
            .with_localized_description("Please sign in again")
            .with_data(json!({"realm": "api"}));

        let envelope = serde_json::to_value(err.to_envelope(Some("req-1"))).unwrap();
        assert_eq!(
            envelope,
            json!({
                "error": {
                    "code": "UNAUTHORIZED",
                    "message": "Bad token",
                    "localizedDescription": "Please sign in again",
                    "data": {"realm": "api"}
                },
                "requestId": "req-1"
            })
        );
    }

    #[test]
    fn test_envelope_omits_absent_fields() {
        let envelope = serde_json::to_value(ApexError::not_found("gone").to_envelope(None)).unwrap();
        assert!(envelope.get("requestId").is_none());
        assert!(envelope["error"].get("data").is_none());
    }

    #[test]
    fn test_unexpected_error_is_hidden() {
        let err = HandlerError::unexpected(anyhow::anyhow!("db password wrong"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.as_apex().is_none());

        let client = err.into_client_error(false);
        assert_eq!(client.code(), ErrorCode::InternalServerError);
        assert!(!client.message().contains("password"));
    }

    #[test]
    fn test_unexpected_error_exposed_when_asked() {
        let err = HandlerError::unexpected(anyhow::anyhow!("db down"));
        assert!(err.into_client_error(true).message().contains("db down"));
    }

    #[test]
    fn test_question_mark_conversions() {
        fn parse() -> HandlerResult<serde_json::Value> {
            Ok(serde_json::from_str("{not json")?)
        }
        fn deny() -> HandlerResult<()> {
            Err(ApexError::forbidden("nope"))?
        }

        assert!(matches!(parse(), Err(HandlerError::Unexpected(_))));
        assert_eq!(deny().unwrap_err().status(), StatusCode::FORBIDDEN);
    }
}
