//! Errors raised while assembling an [`ApexConfig`](crate::ApexConfig).

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required file does not exist.
    #[error("no configuration at {}", path.display())]
    Missing {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read {}", path.display())]
    Io {
        /// The path that was read.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Neither `toml` nor `json`.
    #[error("unsupported configuration format `{0}`")]
    UnsupportedFormat(String),

    /// Malformed TOML.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON, or a document that does not fit the settings tree.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A `.env` file could not be parsed.
    #[error(transparent)]
    Dotenv(#[from] dotenvy::Error),

    /// A prefixed variable that names no setting.
    #[error("{var} does not name a setting")]
    UnknownVariable {
        /// The variable name.
        var: String,
    },

    /// A prefixed variable whose value has the wrong type.
    #[error("{var}: expected {expected}")]
    BadVariable {
        /// The variable name.
        var: String,
        /// The type the setting holds.
        expected: &'static str,
    },

    /// A setting that parsed but makes no sense.
    #[error("{field}: {reason}")]
    Invalid {
        /// Dotted setting name, e.g. `server.http_addr`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn bad_variable(var: &str, expected: &'static str) -> Self {
        Self::BadVariable {
            var: var.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_culprit() {
        let err = ConfigError::invalid("server.http_addr", "not a socket address");
        assert_eq!(err.to_string(), "server.http_addr: not a socket address");

        let err = ConfigError::bad_variable("APEX__SERVER__REQUEST_TIMEOUT_MS", "an integer");
        assert_eq!(err.to_string(), "APEX__SERVER__REQUEST_TIMEOUT_MS: expected an integer");

        let err = ConfigError::Missing { path: "/etc/apex.toml".into() };
        assert!(err.to_string().contains("/etc/apex.toml"));
    }
}
