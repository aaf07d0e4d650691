//! Typed query declarations.
//!
//! A route path may declare the query parameters it understands after a
//! `?`, for example `/search?q=string&page=int&tags=[string]`. The
//! declaration is used to convert the raw query string of a request into
//! JSON values before they reach middleware and handlers.

use crate::error::{PathError, QueryError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Epoch values at or above this magnitude are read as milliseconds.
const EPOCH_MILLIS_THRESHOLD: u64 = 100_000_000_000;

/// The scalar type of a declared query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Passed through unchanged.
    String,
    /// Floating point; declared as `number`, `float`, `decimal` or `double`.
    Number,
    /// Signed integer; declared as `int`.
    Int,
    /// `true`/`false`/`1`/`0`.
    Boolean,
    /// An ISO 8601 date or date-time; declared as `date` or `isoDate`.
    Date,
    /// Seconds or milliseconds since the Unix epoch; declared as `epochDate`.
    EpochDate,
    /// A JSON-encoded object.
    Object,
    /// A lone key such as `?verbose`: declared, but not converted.
    Untyped,
}

impl QueryKind {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Self::String,
            "number" | "float" | "decimal" | "double" => Self::Number,
            "int" => Self::Int,
            "boolean" => Self::Boolean,
            "date" | "isoDate" => Self::Date,
            "epochDate" => Self::EpochDate,
            "object" => Self::Object,
            _ => return None,
        })
    }

    /// The name used when displaying this kind.
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Int => "int",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::EpochDate => "epochDate",
            Self::Object => "object",
            Self::Untyped => "unknown",
        }
    }

    fn coerce(self, key: &str, raw: &str) -> Result<Value, QueryError> {
        let fail = || QueryError {
            key: key.to_string(),
            expected: self.name(),
            value: raw.to_string(),
        };

        match self {
            Self::String | Self::Untyped => Ok(Value::String(raw.to_string())),
            Self::Int => raw
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| fail()),
            Self::Number => raw
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(fail),
            Self::Boolean => match raw {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            Self::Date => parse_iso_date(raw).map(rfc3339).ok_or_else(fail),
            Self::EpochDate => parse_epoch(raw).map(rfc3339).ok_or_else(fail),
            Self::Object => match serde_json::from_str::<Value>(raw) {
                Ok(value @ Value::Object(_)) => Ok(value),
                _ => Err(fail()),
            },
        }
    }
}

// Accepts a full RFC 3339 timestamp, a date-time without offset (read as
// UTC), or a bare calendar date (midnight UTC).
fn parse_iso_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    let n = raw.parse::<i64>().ok()?;
    if n.unsigned_abs() >= EPOCH_MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}

fn rfc3339(dt: DateTime<Utc>) -> Value {
    Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryField {
    key: String,
    kind: QueryKind,
    array: bool,
}

/// The set of query parameters a path declares.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuerySpec {
    fields: Vec<QueryField>,
}

impl QuerySpec {
    /// Parses the part of a path string after `?`.
    ///
    /// `path` is only used for error messages.
    pub fn parse(declaration: &str, path: &str) -> Result<Self, PathError> {
        let mut spec = Self::default();

        for pair in declaration.split('&').filter(|p| !p.is_empty()) {
            let (key, ty) = match pair.split_once('=') {
                Some((key, ty)) => (key, Some(ty)),
                None => (pair, None),
            };

            if key.is_empty() {
                return Err(PathError::invalid(path, "empty query key"));
            }

            let (kind, array) = match ty {
                None => (QueryKind::Untyped, false),
                Some(ty) => {
                    let (array, ty) = match ty.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
                        Some(inner) => (true, inner),
                        None => (false, ty),
                    };
                    let kind = QueryKind::parse(ty).ok_or_else(|| {
                        PathError::invalid(path, format!("unknown query type '{ty}' for '{key}'"))
                    })?;
                    (kind, array)
                }
            };

            spec.insert(
                QueryField {
                    key: key.to_string(),
                    kind,
                    array,
                },
                path,
            )?;
        }

        Ok(spec)
    }

    fn insert(&mut self, field: QueryField, path: &str) -> Result<(), PathError> {
        if self.fields.iter().any(|f| f.key == field.key) {
            return Err(PathError::DuplicateQueryKey {
                key: field.key,
                path: path.to_string(),
            });
        }
        self.fields.push(field);
        Ok(())
    }

    /// Returns the union of two declarations.
    pub fn union(&self, other: &Self, path: &str) -> Result<Self, PathError> {
        let mut merged = self.clone();
        for field in &other.fields {
            merged.insert(field.clone(), path)?;
        }
        Ok(merged)
    }

    /// Returns true if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the declared kind of `key` and whether it is an array.
    pub fn kind_of(&self, key: &str) -> Option<(QueryKind, bool)> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| (f.kind, f.array))
    }

    /// Converts raw query pairs into a JSON object.
    ///
    /// Declared keys are converted to their type; array keys collect every
    /// occurrence. Undeclared keys are kept as strings, or arrays of strings
    /// when repeated. A repeated scalar key keeps its last value.
    pub fn coerce<I, K, V>(&self, pairs: I) -> Result<Map<String, Value>, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut out = Map::new();

        for (key, raw) in pairs {
            let (key, raw) = (key.as_ref(), raw.as_ref());

            match self.kind_of(key) {
                Some((kind, true)) => {
                    let value = kind.coerce(key, raw)?;
                    match out.entry(key).or_insert_with(|| Value::Array(Vec::new())) {
                        Value::Array(items) => items.push(value),
                        slot => *slot = Value::Array(vec![value]),
                    }
                }
                Some((kind, false)) => {
                    out.insert(key.to_string(), kind.coerce(key, raw)?);
                }
                None => {
                    let value = Value::String(raw.to_string());
                    match out.get_mut(key) {
                        Some(Value::Array(items)) => items.push(value),
                        Some(existing) => {
                            let first = existing.take();
                            *existing = Value::Array(vec![first, value]);
                        }
                        None => {
                            out.insert(key.to_string(), value);
                        }
                    }
                }
            }
        }

        Ok(out)
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            match (field.kind, field.array) {
                (QueryKind::Untyped, _) => f.write_str(&field.key)?,
                (kind, true) => write!(f, "{}=[{}]", field.key, kind.name())?,
                (kind, false) => write!(f, "{}={}", field.key, kind.name())?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(decl: &str) -> QuerySpec {
        QuerySpec::parse(decl, "/test").unwrap()
    }

    #[test]
    fn test_parse_declaration() {
        let spec = spec("page=int&tags=[string]&ratio=double");
        assert_eq!(spec.kind_of("page"), Some((QueryKind::Int, false)));
        assert_eq!(spec.kind_of("tags"), Some((QueryKind::String, true)));
        assert_eq!(spec.kind_of("ratio"), Some((QueryKind::Number, false)));
        assert_eq!(spec.kind_of("missing"), None);
        assert_eq!(spec.to_string(), "page=int&tags=[string]&ratio=number");
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let err = QuerySpec::parse("page=uuid", "/x").unwrap_err();
        assert!(matches!(err, PathError::InvalidPath { .. }));
    }

    #[test]
    fn test_parse_lone_keys() {
        let spec = spec("q=string&verbose&flag");
        assert_eq!(spec.kind_of("verbose"), Some((QueryKind::Untyped, false)));
        assert_eq!(spec.kind_of("flag"), Some((QueryKind::Untyped, false)));
        assert_eq!(spec.to_string(), "q=string&verbose&flag");

        let out = spec.coerce([("verbose", "yes"), ("q", "rust")]).unwrap();
        assert_eq!(Value::Object(out), json!({"verbose": "yes", "q": "rust"}));
    }

    #[test]
    fn test_parse_rejects_empty_key() {
        assert!(QuerySpec::parse("=int", "/x").is_err());
    }

    #[test]
    fn test_parse_date_kinds() {
        let spec = spec("from=date&since=isoDate&at=epochDate&days=[date]");
        assert_eq!(spec.kind_of("from"), Some((QueryKind::Date, false)));
        assert_eq!(spec.kind_of("since"), Some((QueryKind::Date, false)));
        assert_eq!(spec.kind_of("at"), Some((QueryKind::EpochDate, false)));
        assert_eq!(spec.kind_of("days"), Some((QueryKind::Date, true)));
    }

    #[test]
    fn test_coerce_iso_dates() {
        let spec = spec("since=isoDate");

        let cases = [
            ("2024-03-01T12:30:00+02:00", "2024-03-01T10:30:00Z"),
            ("2024-03-01T12:30:00", "2024-03-01T12:30:00Z"),
            ("2024-03-01", "2024-03-01T00:00:00Z"),
        ];
        for (raw, expected) in cases {
            let out = spec.coerce([("since", raw)]).unwrap();
            assert_eq!(out["since"], json!(expected), "input {raw}");
        }
    }

    #[test]
    fn test_coerce_epoch_seconds_and_millis() {
        let spec = spec("at=epochDate");

        let seconds = spec.coerce([("at", "1700000000")]).unwrap();
        assert_eq!(seconds["at"], json!("2023-11-14T22:13:20Z"));

        let millis = spec.coerce([("at", "1700000000123")]).unwrap();
        assert_eq!(millis["at"], json!("2023-11-14T22:13:20.123Z"));
    }

    #[test]
    fn test_coerce_rejects_bad_dates() {
        let err = spec("since=date").coerce([("since", "not-a-date")]).unwrap_err();
        assert_eq!(err.key, "since");
        assert_eq!(err.expected, "date");

        assert!(spec("since=date").coerce([("since", "2024-02-30")]).is_err());
        assert!(spec("at=epochDate").coerce([("at", "yesterday")]).is_err());
    }

    #[test]
    fn test_parse_rejects_duplicate_key() {
        let err = QuerySpec::parse("a=int&a=string", "/x").unwrap_err();
        assert!(matches!(err, PathError::DuplicateQueryKey { ref key, .. } if key == "a"));
    }

    #[test]
    fn test_coerce_declared_types() {
        let spec = spec("page=int&tags=[string]&active=boolean&score=number");
        let out = spec
            .coerce([
                ("page", "2"),
                ("tags", "a"),
                ("tags", "b"),
                ("active", "1"),
                ("score", "0.5"),
            ])
            .unwrap();

        assert_eq!(
            Value::Object(out),
            json!({"page": 2, "tags": ["a", "b"], "active": true, "score": 0.5})
        );
    }

    #[test]
    fn test_coerce_undeclared_passthrough() {
        let out = QuerySpec::default()
            .coerce([("q", "rust"), ("x", "1"), ("x", "2")])
            .unwrap();
        assert_eq!(Value::Object(out), json!({"q": "rust", "x": ["1", "2"]}));
    }

    #[test]
    fn test_coerce_failure_names_key() {
        let err = spec("page=int").coerce([("page", "two")]).unwrap_err();
        assert_eq!(err.key, "page");
        assert_eq!(err.expected, "int");
        assert_eq!(err.value, "two");
    }

    #[test]
    fn test_coerce_object() {
        let spec = spec("filter=object");
        let out = spec.coerce([("filter", r#"{"a":1}"#)]).unwrap();
        assert_eq!(out["filter"], json!({"a": 1}));
        assert!(spec.coerce([("filter", "[1]")]).is_err());
    }

    #[test]
    fn test_union_detects_collision() {
        let a = spec("page=int");
        let b = spec("limit=int");
        let merged = a.union(&b, "/x").unwrap();
        assert!(merged.kind_of("limit").is_some());
        assert!(merged.union(&a, "/x").is_err());
    }
}
