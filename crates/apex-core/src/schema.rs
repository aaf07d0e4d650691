//! Schema adapter.
//!
//! A [`Schema`] is a structural description of an expected JSON value. It is
//! compiled once, when a route is defined, into a [`Validator`]: an
//! immutable, cheaply clonable handle that can be shared across every
//! request and worker. Validation never fails exceptionally; a mismatch is
//! reported as [`ValidationErrors`], one entry per offending field, each
//! with a JSON pointer to the field.
//!
//! Other validation engines plug in through the [`Validate`] trait.
//!
//! # Example
//!
//! ```
//! use apex_core::schema::Schema;
//! use serde_json::json;
//!
//! let validator = Schema::object([("name", Schema::string().min_length(1))])
//!     .optional("age", Schema::integer().minimum(0))
//!     .compile()
//!     .unwrap();
//!
//! assert!(validator.validate(json!({"name": "Ann"})).is_ok());
//!
//! let errors = validator.validate(json!({"name": 123})).unwrap_err();
//! assert_eq!(errors.first().unwrap().path, "/name");
//! ```

use crate::error::ApexError;
use indexmap::IndexMap;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A structural description of a JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schema {
    /// A string.
    String {
        /// Minimum length in characters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        /// Maximum length in characters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        /// Regular expression the whole value must match.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    /// An integral number.
    Integer {
        /// Inclusive lower bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
        /// Inclusive upper bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<i64>,
    },
    /// Any number.
    Number {
        /// Inclusive lower bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        /// Inclusive upper bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    /// `true` or `false`.
    Boolean,
    /// A homogeneous array.
    Array {
        /// Schema of every item.
        items: Box<Schema>,
        /// Minimum number of items.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        /// Maximum number of items.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    /// An object with known properties.
    Object {
        /// Property schemas, in declaration order.
        #[serde(default)]
        properties: IndexMap<String, Schema>,
        /// Properties that must be present.
        #[serde(default)]
        required: Vec<String>,
        /// Whether keys not listed in `properties` are accepted.
        #[serde(default = "default_true")]
        additional_properties: bool,
    },
    /// One of a fixed set of values.
    Enum {
        /// Accepted values.
        values: Vec<Value>,
    },
    /// `null` or the inner schema.
    Nullable {
        /// Schema for non-null values.
        inner: Box<Schema>,
    },
    /// Matches if any variant matches.
    AnyOf {
        /// Candidate schemas.
        variants: Vec<Schema>,
    },
    /// Accepts anything.
    Any,
    /// Only `null`.
    Null,
}

const fn default_true() -> bool {
    true
}

impl Schema {
    /// A string schema.
    #[must_use]
    pub fn string() -> Self {
        Self::String {
            min_length: None,
            max_length: None,
            pattern: None,
        }
    }

    /// An integer schema.
    #[must_use]
    pub fn integer() -> Self {
        Self::Integer {
            minimum: None,
            maximum: None,
        }
    }

    /// A number schema.
    #[must_use]
    pub fn number() -> Self {
        Self::Number {
            minimum: None,
            maximum: None,
        }
    }

    /// A boolean schema.
    #[must_use]
    pub fn boolean() -> Self {
        Self::Boolean
    }

    /// An array of `items`.
    #[must_use]
    pub fn array(items: Schema) -> Self {
        Self::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        }
    }

    /// An object whose listed properties are all required.
    ///
    /// Unknown keys are accepted; see [`Schema::strict`].
    pub fn object<K, I>(properties: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Schema)>,
    {
        let properties: IndexMap<String, Schema> = properties
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect();
        let required = properties.keys().cloned().collect();
        Self::Object {
            properties,
            required,
            additional_properties: true,
        }
    }

    /// One of the given values.
    pub fn one_of_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self::Enum {
            values: values.into_iter().collect(),
        }
    }

    /// Exactly `value`.
    #[must_use]
    pub fn literal(value: Value) -> Self {
        Self::Enum {
            values: vec![value],
        }
    }

    /// Any of `variants`.
    pub fn any_of(variants: impl IntoIterator<Item = Schema>) -> Self {
        Self::AnyOf {
            variants: variants.into_iter().collect(),
        }
    }

    /// Accepts anything.
    #[must_use]
    pub fn any() -> Self {
        Self::Any
    }

    /// Only `null`.
    #[must_use]
    pub fn null() -> Self {
        Self::Null
    }

    /// Also accepts `null`.
    #[must_use]
    pub fn nullable(self) -> Self {
        Self::Nullable {
            inner: Box::new(self),
        }
    }

    /// Sets the minimum length of a string schema.
    #[must_use]
    pub fn min_length(self, len: usize) -> Self {
        match self {
            Self::String {
                max_length,
                pattern,
                ..
            } => Self::String {
                min_length: Some(len),
                max_length,
                pattern,
            },
            other => other,
        }
    }

    /// Sets the maximum length of a string schema.
    #[must_use]
    pub fn max_length(self, len: usize) -> Self {
        match self {
            Self::String {
                min_length,
                pattern,
                ..
            } => Self::String {
                min_length,
                max_length: Some(len),
                pattern,
            },
            other => other,
        }
    }

    /// Sets the pattern of a string schema.
    #[must_use]
    pub fn pattern(self, regex: impl Into<String>) -> Self {
        match self {
            Self::String {
                min_length,
                max_length,
                ..
            } => Self::String {
                min_length,
                max_length,
                pattern: Some(regex.into()),
            },
            other => other,
        }
    }

    /// Sets the lower bound of an integer or number schema.
    #[must_use]
    pub fn minimum(self, min: i64) -> Self {
        match self {
            Self::Integer { maximum, .. } => Self::Integer {
                minimum: Some(min),
                maximum,
            },
            Self::Number { maximum, .. } => Self::Number {
                minimum: Some(min as f64),
                maximum,
            },
            other => other,
        }
    }

    /// Sets the upper bound of an integer or number schema.
    #[must_use]
    pub fn maximum(self, max: i64) -> Self {
        match self {
            Self::Integer { minimum, .. } => Self::Integer {
                minimum,
                maximum: Some(max),
            },
            Self::Number { minimum, .. } => Self::Number {
                minimum,
                maximum: Some(max as f64),
            },
            other => other,
        }
    }

    /// Sets the item count bounds of an array schema.
    #[must_use]
    pub fn items_between(self, min: usize, max: usize) -> Self {
        match self {
            Self::Array { items, .. } => Self::Array {
                items,
                min_items: Some(min),
                max_items: Some(max),
            },
            other => other,
        }
    }

    /// Adds an optional property to an object schema.
    #[must_use]
    pub fn optional(mut self, key: impl Into<String>, schema: Schema) -> Self {
        if let Self::Object {
            properties,
            required,
            ..
        } = &mut self
        {
            let key = key.into();
            required.retain(|k| k != &key);
            properties.insert(key, schema);
        }
        self
    }

    /// Rejects keys not declared on an object schema.
    #[must_use]
    pub fn strict(mut self) -> Self {
        if let Self::Object {
            additional_properties,
            ..
        } = &mut self
        {
            *additional_properties = false;
        }
        self
    }

    /// Compiles this schema into a reusable validator.
    ///
    /// Patterns are compiled here, once.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] for an invalid pattern or inverted bounds.
    pub fn compile(&self) -> Result<Validator, SchemaError> {
        Ok(Validator::new(Node::compile(self)?))
    }
}

/// The schema could not be compiled.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// A string pattern is not a valid regular expression.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern.
        pattern: String,
        /// The regex error.
        #[source]
        source: regex::Error,
    },

    /// A lower bound exceeds its upper bound.
    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    /// A required property has no schema.
    #[error("required property '{0}' is not declared")]
    UndeclaredRequired(String),
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// JSON pointer to the offending value (`""` for the root).
    pub path: String,
    /// Human-readable reason.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// All failures found while validating one value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Error)]
#[serde(transparent)]
#[error("{} validation error(s)", .0.len())]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure.
    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of failures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The first failure.
    pub fn first(&self) -> Option<&ValidationError> {
        self.0.first()
    }

    /// Iterates over failures.
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// Converts into the 422 error sent to clients, with the failures
    /// under `data.errors`.
    pub fn into_apex(self, message: impl Into<String>) -> ApexError {
        ApexError::unprocessable(message).with_data(json!({ "errors": self.0 }))
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

impl FromIterator<ValidationError> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = ValidationError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A validation engine.
///
/// Implemented by compiled [`Schema`]s; implement it to plug in another
/// engine. Implementations must be pure: the same value always yields the
/// same result.
pub trait Validate: Send + Sync + 'static {
    /// Checks `value`, returning it (possibly normalized) on success.
    fn validate(&self, value: Value) -> Result<Value, ValidationErrors>;
}

/// A compiled, shareable validator.
#[derive(Clone)]
pub struct Validator(Arc<dyn Validate>);

impl Validator {
    /// Wraps a validation engine.
    pub fn new(engine: impl Validate) -> Self {
        Self(Arc::new(engine))
    }

    /// Wraps a validation function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ValidationErrors> + Send + Sync + 'static,
    {
        struct FnValidate<F>(F);

        impl<F> Validate for FnValidate<F>
        where
            F: Fn(Value) -> Result<Value, ValidationErrors> + Send + Sync + 'static,
        {
            fn validate(&self, value: Value) -> Result<Value, ValidationErrors> {
                (self.0)(value)
            }
        }

        Self::new(FnValidate(f))
    }

    /// Validates `value`.
    pub fn validate(&self, value: Value) -> Result<Value, ValidationErrors> {
        self.0.validate(value)
    }

    /// True if both handles share one compiled engine.
    pub fn ptr_eq(&self, other: &Validator) -> bool {
        Arc::as_ptr(&self.0).cast::<()>() == Arc::as_ptr(&other.0).cast::<()>()
    }

    /// Validates `value` and deserializes it into `T`.
    ///
    /// A value that passes the schema but does not fit `T` is reported as a
    /// root-level validation error.
    pub fn validate_as<T: DeserializeOwned>(&self, value: Value) -> Result<T, ValidationErrors> {
        let value = self.validate(value)?;
        serde_json::from_value(value).map_err(|e| ValidationError::new("", e.to_string()).into())
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator")
    }
}

/// Conversion into a compiled validator.
///
/// Lets route builders accept either a [`Schema`] (compiled on the spot) or
/// a ready [`Validator`].
pub trait IntoValidator {
    /// Performs the conversion.
    fn into_validator(self) -> Result<Validator, SchemaError>;
}

impl IntoValidator for Schema {
    fn into_validator(self) -> Result<Validator, SchemaError> {
        self.compile()
    }
}

impl IntoValidator for &Schema {
    fn into_validator(self) -> Result<Validator, SchemaError> {
        self.compile()
    }
}

impl IntoValidator for Validator {
    fn into_validator(self) -> Result<Validator, SchemaError> {
        Ok(self)
    }
}

/// Compiled form of [`Schema`].
#[derive(Debug)]
enum Node {
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
        pattern: Option<Regex>,
    },
    Integer {
        minimum: Option<i64>,
        maximum: Option<i64>,
    },
    Number {
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    Boolean,
    Array {
        items: Box<Node>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Object {
        properties: Vec<(String, Node, bool)>,
        additional_properties: bool,
    },
    Enum(Vec<Value>),
    Nullable(Box<Node>),
    AnyOf(Vec<Node>),
    Any,
    Null,
}

fn check_bounds<T: PartialOrd + fmt::Display>(
    what: &str,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), SchemaError> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(SchemaError::InvalidBounds(format!(
            "{what}: minimum {min} is greater than maximum {max}"
        ))),
        _ => Ok(()),
    }
}

impl Node {
    fn compile(schema: &Schema) -> Result<Self, SchemaError> {
        Ok(match schema {
            Schema::String {
                min_length,
                max_length,
                pattern,
            } => {
                check_bounds("string length", *min_length, *max_length)?;
                let pattern = pattern
                    .as_deref()
                    .map(|p| {
                        Regex::new(&format!("^(?:{p})$")).map_err(|source| {
                            SchemaError::InvalidPattern {
                                pattern: p.to_string(),
                                source,
                            }
                        })
                    })
                    .transpose()?;
                Self::String {
                    min_length: *min_length,
                    max_length: *max_length,
                    pattern,
                }
            }
            Schema::Integer { minimum, maximum } => {
                check_bounds("integer", *minimum, *maximum)?;
                Self::Integer {
                    minimum: *minimum,
                    maximum: *maximum,
                }
            }
            Schema::Number { minimum, maximum } => {
                check_bounds("number", *minimum, *maximum)?;
                Self::Number {
                    minimum: *minimum,
                    maximum: *maximum,
                }
            }
            Schema::Boolean => Self::Boolean,
            Schema::Array {
                items,
                min_items,
                max_items,
            } => {
                check_bounds("array length", *min_items, *max_items)?;
                Self::Array {
                    items: Box::new(Self::compile(items)?),
                    min_items: *min_items,
                    max_items: *max_items,
                }
            }
            Schema::Object {
                properties,
                required,
                additional_properties,
            } => {
                if let Some(missing) = required.iter().find(|k| !properties.contains_key(*k)) {
                    return Err(SchemaError::UndeclaredRequired(missing.clone()));
                }
                let properties = properties
                    .iter()
                    .map(|(key, schema)| {
                        Ok((key.clone(), Self::compile(schema)?, required.contains(key)))
                    })
                    .collect::<Result<_, SchemaError>>()?;
                Self::Object {
                    properties,
                    additional_properties: *additional_properties,
                }
            }
            Schema::Enum { values } => Self::Enum(values.clone()),
            Schema::Nullable { inner } => Self::Nullable(Box::new(Self::compile(inner)?)),
            Schema::AnyOf { variants } => Self::AnyOf(
                variants
                    .iter()
                    .map(Self::compile)
                    .collect::<Result<_, _>>()?,
            ),
            Schema::Any => Self::Any,
            Schema::Null => Self::Null,
        })
    }

    fn check(&self, value: &Value, path: &str, errors: &mut ValidationErrors) {
        let mut fail = |message: String| errors.push(ValidationError::new(path, message));

        match self {
            Self::Any => {}
            Self::Null => {
                if !value.is_null() {
                    fail(format!("expected null, got {}", value_type_name(value)));
                }
            }
            Self::Boolean => {
                if !value.is_boolean() {
                    fail(format!("expected boolean, got {}", value_type_name(value)));
                }
            }
            Self::String {
                min_length,
                max_length,
                pattern,
            } => {
                let Some(s) = value.as_str() else {
                    return fail(format!("expected string, got {}", value_type_name(value)));
                };
                let len = s.chars().count();
                if let Some(min) = min_length.filter(|min| len < *min) {
                    fail(format!("string length {len} is less than minimum {min}"));
                } else if let Some(max) = max_length.filter(|max| len > *max) {
                    fail(format!("string length {len} is greater than maximum {max}"));
                } else if let Some(re) = pattern.as_ref().filter(|re| !re.is_match(s)) {
                    fail(format!("does not match pattern '{}'", pattern_source(re)));
                }
            }
            Self::Integer { minimum, maximum } => {
                let Some(n) = integer_value(value) else {
                    return fail(format!("expected integer, got {}", value_type_name(value)));
                };
                if let Some(min) = minimum.filter(|min| n < i128::from(*min)) {
                    fail(format!("value {n} is less than minimum {min}"));
                } else if let Some(max) = maximum.filter(|max| n > i128::from(*max)) {
                    fail(format!("value {n} is greater than maximum {max}"));
                }
            }
            Self::Number { minimum, maximum } => {
                let Some(n) = value.as_f64() else {
                    return fail(format!("expected number, got {}", value_type_name(value)));
                };
                if let Some(min) = minimum.filter(|min| n < *min) {
                    fail(format!("value {n} is less than minimum {min}"));
                } else if let Some(max) = maximum.filter(|max| n > *max) {
                    fail(format!("value {n} is greater than maximum {max}"));
                }
            }
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                let Some(arr) = value.as_array() else {
                    return fail(format!("expected array, got {}", value_type_name(value)));
                };
                if let Some(min) = min_items.filter(|min| arr.len() < *min) {
                    fail(format!("array length {} is less than minimum {min}", arr.len()));
                } else if let Some(max) = max_items.filter(|max| arr.len() > *max) {
                    fail(format!("array length {} is greater than maximum {max}", arr.len()));
                }
                for (idx, item) in arr.iter().enumerate() {
                    items.check(item, &format!("{path}/{idx}"), errors);
                }
            }
            Self::Object {
                properties,
                additional_properties,
            } => {
                let Some(obj) = value.as_object() else {
                    return fail(format!("expected object, got {}", value_type_name(value)));
                };
                for (key, node, required) in properties {
                    let child = format!("{path}/{}", escape_pointer(key));
                    match obj.get(key) {
                        Some(v) => node.check(v, &child, errors),
                        None if *required => {
                            errors.push(ValidationError::new(child, "required property is missing"));
                        }
                        None => {}
                    }
                }
                if !additional_properties {
                    for key in obj.keys() {
                        if !properties.iter().any(|(k, _, _)| k == key) {
                            errors.push(ValidationError::new(
                                format!("{path}/{}", escape_pointer(key)),
                                "unknown property",
                            ));
                        }
                    }
                }
            }
            Self::Enum(values) => {
                if !values.contains(value) {
                    fail(format!("must be one of {}", Value::Array(values.clone())));
                }
            }
            Self::Nullable(inner) => {
                if !value.is_null() {
                    inner.check(value, path, errors);
                }
            }
            Self::AnyOf(variants) => {
                let matched = variants.iter().any(|variant| {
                    let mut scratch = ValidationErrors::new();
                    variant.check(value, path, &mut scratch);
                    scratch.is_empty()
                });
                if !matched {
                    fail("does not match any allowed variant".to_string());
                }
            }
        }
    }
}

impl Validate for Node {
    fn validate(&self, value: Value) -> Result<Value, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        self.check(&value, "", &mut errors);
        if errors.is_empty() {
            Ok(value)
        } else {
            Err(errors)
        }
    }
}

fn pattern_source(re: &Regex) -> &str {
    let s = re.as_str();
    s.strip_prefix("^(?:")
        .and_then(|s| s.strip_suffix(")$"))
        .unwrap_or(s)
}

#[allow(clippy::cast_possible_truncation)]
fn integer_value(value: &Value) -> Option<i128> {
    if let Some(n) = value.as_i64() {
        return Some(i128::from(n));
    }
    if let Some(n) = value.as_u64() {
        return Some(i128::from(n));
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && f.is_finite())
        .map(|f| f as i128)
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Returns a human-readable name for a JSON value type.
fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_schema() -> Schema {
        Schema::object([
            ("name", Schema::string().min_length(1)),
            ("age", Schema::integer().minimum(0).maximum(150)),
        ])
        .optional("tags", Schema::array(Schema::string()))
    }

    fn paths(errors: &ValidationErrors) -> Vec<&str> {
        errors.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_valid_value_is_returned() {
        let v = user_schema().compile().unwrap();
        let value = json!({"name": "Ann", "age": 30});
        assert_eq!(v.validate(value.clone()).unwrap(), value);
    }

    #[test]
    fn test_wrong_type_points_at_field() {
        let v = Schema::object([("name", Schema::string())]).compile().unwrap();
        let errors = v.validate(json!({"name": 123})).unwrap_err();
        assert_eq!(paths(&errors), vec!["/name"]);
        assert!(errors.first().unwrap().message.contains("expected string"));
    }

    #[test]
    fn test_collects_every_failure() {
        let v = user_schema().compile().unwrap();
        let errors = v
            .validate(json!({"name": "", "tags": ["ok", 5]}))
            .unwrap_err();
        assert_eq!(paths(&errors), vec!["/name", "/age", "/tags/1"]);
    }

    #[test]
    fn test_optional_property_may_be_absent() {
        let v = user_schema().compile().unwrap();
        assert!(v.validate(json!({"name": "a", "age": 1})).is_ok());
        assert!(v.validate(json!({"name": "a", "age": 1, "tags": null})).is_err());
    }

    #[test]
    fn test_strict_rejects_unknown_keys() {
        let v = Schema::object([("a", Schema::any())]).strict().compile().unwrap();
        let errors = v.validate(json!({"a": 1, "b/c": 2})).unwrap_err();
        assert_eq!(paths(&errors), vec!["/b~1c"]);
    }

    #[test]
    fn test_integer_accepts_integral_floats_only() {
        let v = Schema::integer().compile().unwrap();
        assert!(v.validate(json!(3)).is_ok());
        assert!(v.validate(json!(3.0)).is_ok());
        assert!(v.validate(json!(3.5)).is_err());
        assert!(v.validate(json!(u64::MAX)).is_ok());
    }

    #[test]
    fn test_pattern_anchored() {
        let v = Schema::string().pattern("[a-z]+").compile().unwrap();
        assert!(v.validate(json!("abc")).is_ok());
        let errors = v.validate(json!("abc1")).unwrap_err();
        assert!(errors.first().unwrap().message.contains("[a-z]+"));
    }

    #[test]
    fn test_invalid_pattern_fails_compile() {
        let err = Schema::string().pattern("(").compile().unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPattern { .. }));
    }

    #[test]
    fn test_inverted_bounds_fail_compile() {
        let err = Schema::integer().minimum(5).maximum(1).compile().unwrap_err();
        assert!(matches!(err, SchemaError::InvalidBounds(_)));
    }

    #[test]
    fn test_enum_nullable_any_of() {
        let status = Schema::one_of_values([json!("open"), json!("closed")]).compile().unwrap();
        assert!(status.validate(json!("open")).is_ok());
        assert!(status.validate(json!("pending")).is_err());

        let nullable = Schema::string().nullable().compile().unwrap();
        assert!(nullable.validate(json!(null)).is_ok());
        assert!(nullable.validate(json!(1)).is_err());

        let id = Schema::any_of([Schema::string(), Schema::integer()]).compile().unwrap();
        assert!(id.validate(json!("x")).is_ok());
        assert!(id.validate(json!(7)).is_ok());
        assert!(id.validate(json!(true)).is_err());
    }

    #[test]
    fn test_validate_as_typed() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct User {
            name: String,
            age: u8,
        }

        let v = user_schema().compile().unwrap();
        let user: User = v.validate_as(json!({"name": "Ann", "age": 30})).unwrap();
        assert_eq!(user, User { name: "Ann".into(), age: 30 });
    }

    #[test]
    fn test_into_apex_carries_errors() {
        let errors: ValidationErrors = ValidationError::new("/name", "bad").into();
        let err = errors.into_apex("Invalid input");
        assert_eq!(err.status().as_u16(), 422);
        assert_eq!(err.data().unwrap()["errors"][0]["path"], "/name");
    }

    #[test]
    fn test_schema_serde_descriptor() {
        let schema: Schema = serde_json::from_value(json!({
            "type": "object",
            "properties": {"id": {"type": "integer"}},
            "required": ["id"]
        }))
        .unwrap();
        let v = schema.compile().unwrap();
        assert!(v.validate(json!({"id": 1})).is_ok());
        assert!(v.validate(json!({})).is_err());
    }

    #[test]
    fn test_custom_engine() {
        let v = Validator::from_fn(|value| {
            if value.is_string() {
                Ok(value)
            } else {
                Err(ValidationError::new("", "nope").into())
            }
        });
        assert!(v.validate(json!("x")).is_ok());
        assert!(v.validate(json!(1)).is_err());
    }
}
