//! Declared authentication schemes.
//!
//! Apex does not authenticate anyone. Applications declare the schemes
//! their API accepts (an API key header, bearer tokens, OAuth2 flows) once
//! on the dispatcher, and security middleware look them up by name to know
//! where a credential lives. The serialized form follows the OpenAPI
//! security scheme object.
//!
//! ```rust
//! use apex_core::{ApiKeyLocation, SecurityScheme, SecuritySchemes};
//!
//! let schemes = SecuritySchemes::new()
//!     .with("bearer", SecurityScheme::bearer("JWT"))
//!     .with("key", SecurityScheme::api_key("x-api-key", ApiKeyLocation::Header));
//!
//! assert_eq!(schemes.get("key").and_then(SecurityScheme::credential_name), Some("x-api-key"));
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where an API key is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    /// A request header.
    Header,
    /// A query parameter.
    Query,
    /// A cookie.
    Cookie,
}

/// One OAuth2 flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthFlow {
    /// Authorization endpoint (implicit and authorization code flows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    /// Token endpoint (password, client credentials and code flows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    /// Refresh endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_url: Option<String>,
    /// Scope names and their descriptions.
    #[serde(default)]
    pub scopes: IndexMap<String, String>,
}

/// The OAuth2 flows a scheme supports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthFlows {
    /// Implicit grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implicit: Option<OAuthFlow>,
    /// Resource owner password grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<OAuthFlow>,
    /// Client credentials grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_credentials: Option<OAuthFlow>,
    /// Authorization code grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<OAuthFlow>,
}

/// A declared authentication scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SecurityScheme {
    /// A key sent in a header, query parameter or cookie.
    #[serde(rename = "apiKey")]
    ApiKey {
        /// Name of the header, parameter or cookie.
        name: String,
        /// Where the key is sent.
        #[serde(rename = "in")]
        location: ApiKeyLocation,
        /// Free-form description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },

    /// An HTTP `Authorization` scheme such as `basic` or `bearer`.
    #[serde(rename = "http", rename_all = "camelCase")]
    Http {
        /// The scheme name, e.g. `bearer`.
        scheme: String,
        /// Hint about the token format, e.g. `JWT`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bearer_format: Option<String>,
        /// Free-form description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },

    /// OAuth2.
    #[serde(rename = "oauth2")]
    OAuth2 {
        /// Supported flows.
        flows: OAuthFlows,
        /// Free-form description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl SecurityScheme {
    /// An API key sent as `name` in `location`.
    pub fn api_key(name: impl Into<String>, location: ApiKeyLocation) -> Self {
        Self::ApiKey {
            name: name.into(),
            location,
            description: None,
        }
    }

    /// A bearer token in the `Authorization` header.
    pub fn bearer(format: impl Into<String>) -> Self {
        Self::Http {
            scheme: "bearer".to_string(),
            bearer_format: Some(format.into()),
            description: None,
        }
    }

    /// Any other HTTP authorization scheme.
    pub fn http(scheme: impl Into<String>) -> Self {
        Self::Http {
            scheme: scheme.into(),
            bearer_format: None,
            description: None,
        }
    }

    /// OAuth2 with the given flows.
    pub fn oauth2(flows: OAuthFlows) -> Self {
        Self::OAuth2 {
            flows,
            description: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            Self::ApiKey { description, .. }
            | Self::Http { description, .. }
            | Self::OAuth2 { description, .. } => *description = Some(text.into()),
        }
        self
    }

    /// The header, parameter or cookie carrying the credential: the key
    /// name for API keys, `authorization` for HTTP schemes, `None` for OAuth2.
    pub fn credential_name(&self) -> Option<&str> {
        match self {
            Self::ApiKey { name, .. } => Some(name),
            Self::Http { .. } => Some("authorization"),
            Self::OAuth2 { .. } => None,
        }
    }

    /// Every scope named by any flow, without duplicates.
    pub fn scopes(&self) -> Vec<&str> {
        let Self::OAuth2 { flows, .. } = self else {
            return Vec::new();
        };
        let mut scopes: Vec<&str> = Vec::new();
        let all = [
            &flows.implicit,
            &flows.password,
            &flows.client_credentials,
            &flows.authorization_code,
        ];
        for flow in all.into_iter().flatten() {
            for scope in flow.scopes.keys() {
                if !scopes.contains(&scope.as_str()) {
                    scopes.push(scope);
                }
            }
        }
        scopes
    }
}

/// The named schemes an application declares.
///
/// Cheap to clone; the dispatcher hands the same set to every request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecuritySchemes(Arc<IndexMap<String, SecurityScheme>>);

impl SecuritySchemes {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the scheme called `name`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, scheme: SecurityScheme) -> Self {
        Arc::make_mut(&mut self.0).insert(name.into(), scheme);
        self
    }

    /// The scheme called `name`.
    pub fn get(&self, name: &str) -> Option<&SecurityScheme> {
        self.0.get(name)
    }

    /// True if `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Schemes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecurityScheme)> {
        self.0.iter().map(|(name, scheme)| (name.as_str(), scheme))
    }

    /// Number of declared schemes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, SecurityScheme)> for SecuritySchemes {
    fn from_iter<I: IntoIterator<Item = (K, SecurityScheme)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |schemes, (name, scheme)| schemes.with(name, scheme))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let key = SecurityScheme::api_key("x-api-key", ApiKeyLocation::Header)
            .with_description("issued per tenant");
        assert_eq!(
            serde_json::to_value(&key).unwrap(),
            json!({"type": "apiKey", "name": "x-api-key", "in": "header", "description": "issued per tenant"})
        );

        assert_eq!(
            serde_json::to_value(SecurityScheme::bearer("JWT")).unwrap(),
            json!({"type": "http", "scheme": "bearer", "bearerFormat": "JWT"})
        );
    }

    #[test]
    fn test_oauth2_round_trips_and_lists_scopes() {
        let raw = json!({
            "type": "oauth2",
            "flows": {
                "authorizationCode": {
                    "authorizationUrl": "https://auth.example.com/authorize",
                    "tokenUrl": "https://auth.example.com/token",
                    "scopes": {"read": "read things", "write": "write things"}
                },
                "clientCredentials": {
                    "tokenUrl": "https://auth.example.com/token",
                    "scopes": {"read": "read things"}
                }
            }
        });

        let scheme: SecurityScheme = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(scheme.scopes(), vec!["read", "write"]);
        assert_eq!(scheme.credential_name(), None);
        assert_eq!(serde_json::to_value(&scheme).unwrap(), raw);
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let result = serde_json::from_value::<SecurityScheme>(
            json!({"type": "openIdConnect", "openIdConnectUrl": "https://x"}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_schemes_keep_order_and_share() {
        let schemes: SecuritySchemes = [
            ("bearer", SecurityScheme::bearer("JWT")),
            ("basic", SecurityScheme::http("basic")),
        ]
        .into_iter()
        .collect();

        let copy = schemes.clone();
        let extended = schemes.with("key", SecurityScheme::api_key("k", ApiKeyLocation::Query));

        assert_eq!(copy.len(), 2);
        assert_eq!(extended.iter().map(|(n, _)| n).collect::<Vec<_>>(), vec!["bearer", "basic", "key"]);
        assert_eq!(extended.get("basic").and_then(SecurityScheme::credential_name), Some("authorization"));
        assert!(!copy.contains("key"));
    }
}
