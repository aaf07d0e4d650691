//! Path and query declaration errors.

use thiserror::Error;

/// Errors raised while parsing or composing route paths.
///
/// These are construction-time errors: they surface when routes are
/// defined, never while a request is being served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path string is malformed.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending path string.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A parameter name appears more than once.
    #[error("duplicate path parameter ':{name}' in '{path}'")]
    DuplicateParamName {
        /// The repeated parameter name.
        name: String,
        /// The path in which the collision was found.
        path: String,
    },

    /// A query key is declared more than once.
    #[error("duplicate query key '{key}' in '{path}'")]
    DuplicateQueryKey {
        /// The repeated key.
        key: String,
        /// The path in which the collision was found.
        path: String,
    },
}

impl PathError {
    pub(crate) fn invalid(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// A query value could not be converted to its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("query parameter '{key}' expected {expected}, got '{value}'")]
pub struct QueryError {
    /// The query key.
    pub key: String,
    /// The declared type name.
    pub expected: &'static str,
    /// The raw value received.
    pub value: String,
}
