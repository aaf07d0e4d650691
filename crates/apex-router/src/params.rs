//! Captured path parameters, kept in the order the path declares them.

use serde_json::{Map, Value};
use smallvec::SmallVec;

/// Routes rarely declare more than this many parameters.
const INLINE_PARAMS: usize = 4;

/// Path parameters captured by [`Path::extract_params`](crate::Path::extract_params).
///
/// # Example
///
/// ```rust
/// use apex_router::Params;
///
/// let mut params = Params::new();
/// params.push("userId", "123");
///
/// assert_eq!(params.get("userId"), Some("123"));
/// assert_eq!(params.get("unknown"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a captured segment.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// The decoded value captured for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter().find_map(|(n, v)| (n == name).then_some(v))
    }

    /// `true` for a path without parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of captured parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// `(name, value)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// A JSON object of string values, the shape params schemas check.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(n, v)| (n.to_string(), Value::from(v)))
                .collect::<Map<_, _>>(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.push(k, v);
        }
        params
    }
}
