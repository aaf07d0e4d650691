//! Per-request execution context.
//!
//! A [`Context`] is created once per request by the application's context
//! factory and then threaded through the middleware chain into the handler.
//! Middleware extend it with [`ContextPatch`]es. Merging is additive with
//! overwrite semantics: new keys are added, existing keys are replaced, and
//! nothing is ever removed.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for request tracking
/// and log correlation.
///
/// # Example
///
/// ```
/// use apex_core::RequestId;
///
/// let id = RequestId::new();
/// let parsed: RequestId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

type Extension = Arc<dyn Any + Send + Sync>;

/// Keyed per-request state.
///
/// Holds JSON values under string keys, in insertion order, plus typed
/// extensions keyed by their Rust type. Cloning is cheap relative to the
/// values it holds: extensions are reference counted.
///
/// # Example
///
/// ```
/// use apex_core::{Context, ContextPatch};
/// use serde_json::json;
///
/// let mut ctx = Context::new();
/// ctx.insert("a", json!(1));
/// ctx.merge(ContextPatch::new().set("b", json!(2)).set("a", json!(3)));
///
/// assert_eq!(ctx.get("a"), Some(&json!(3)));
/// assert_eq!(ctx.get("b"), Some(&json!(2)));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    values: IndexMap<String, Value>,
    extensions: HashMap<TypeId, Extension>,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context from a JSON object. Non-object values yield an
    /// empty context.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        let values = match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => IndexMap::new(),
        };
        Self {
            values,
            extensions: HashMap::new(),
        }
    }

    /// Sets `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Returns the value under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserializes the value under `key` into `T`.
    ///
    /// Returns `None` when the key is absent or has another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| T::deserialize(v).ok())
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterates over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of keyed values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no keyed values are present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stores a typed extension, replacing any previous value of `T`.
    pub fn insert_ext<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Returns the typed extension of type `T`.
    pub fn ext<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Merges a patch into this context.
    ///
    /// Same-named keys and extensions are replaced, new ones are added.
    pub fn merge(&mut self, patch: ContextPatch) {
        for (key, value) in patch.values {
            self.values.insert(key, value);
        }
        self.extensions.extend(patch.extensions);
    }

    /// Returns a copy with `patch` merged in.
    #[must_use]
    pub fn merged(&self, patch: ContextPatch) -> Self {
        let mut next = self.clone();
        next.merge(patch);
        next
    }

    /// Returns the keyed values as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("values", &self.values)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

/// Additions a middleware contributes to the context.
#[derive(Default)]
pub struct ContextPatch {
    values: Vec<(String, Value)>,
    extensions: Vec<(TypeId, Extension)>,
}

impl ContextPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or overwrites `key`.
    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.push((key.into(), value));
        self
    }

    /// Adds or overwrites the typed extension `T`.
    pub fn ext<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.push((TypeId::of::<T>(), Arc::new(value)));
        self
    }

    /// Builds a patch from the fields of a serializable value.
    ///
    /// Non-object values produce an empty patch.
    pub fn from_serialize<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        let mut patch = Self::new();
        if let Value::Object(map) = serde_json::to_value(value)? {
            patch.values.extend(map);
        }
        Ok(patch)
    }

    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.extensions.is_empty()
    }
}

impl fmt::Debug for ContextPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextPatch")
            .field("values", &self.values)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}
