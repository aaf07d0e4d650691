//! Built-in middleware units.
//!
//! - [`recover`] - Error handler that turns failures into replies
//! - [`require_context`] - Security gate on a context key
//! - [`response_headers`] - Serializer that stamps fixed headers on replies

pub mod recover;
pub mod require_context;
pub mod response_headers;

pub use recover::RecoverMiddleware;
pub use require_context::RequireContextKey;
pub use response_headers::ResponseHeaders;
