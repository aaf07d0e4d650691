//! Parsed route paths.

use crate::error::PathError;
use crate::params::Params;
use crate::query::QuerySpec;
use std::fmt;

/// Segment delimiter and required path prefix.
const DELIMITER: char = '/';

/// Prefix marking a named parameter segment.
const PARAM_MARKER: char = ':';

/// A single path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A literal segment, matched exactly (case-sensitive).
    Literal(String),
    /// A named parameter, matching any single non-empty segment.
    Param(String),
}

impl Segment {
    /// Returns the parameter name if this is a parameter segment.
    pub fn param_name(&self) -> Option<&str> {
        match self {
            Self::Param(name) => Some(name),
            Self::Literal(_) => None,
        }
    }
}

/// An immutable, parsed route path.
///
/// A path always starts at the root and its parameter names are unique.
/// Both properties are checked by [`Path::parse`] and preserved by
/// [`Path::join`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    segments: Vec<Segment>,
    query: QuerySpec,
}

impl Path {
    /// The root path `/`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a path string such as `/users/:id?expand=boolean`.
    ///
    /// Empty segments (`//`, trailing `/`) are dropped.
    ///
    /// # Errors
    ///
    /// - [`PathError::InvalidPath`] if the string does not start with `/`,
    ///   contains a parameter marker without a name, or has a malformed
    ///   query declaration
    /// - [`PathError::DuplicateParamName`] if a parameter name repeats
    /// - [`PathError::DuplicateQueryKey`] if a query key repeats
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let (route, declaration) = match path.split_once('?') {
            Some((route, declaration)) => (route, Some(declaration)),
            None => (path, None),
        };

        if !route.starts_with(DELIMITER) {
            return Err(PathError::invalid(path, "must start with '/'"));
        }

        let mut segments = Vec::new();
        for raw in route.split(DELIMITER).filter(|s| !s.is_empty()) {
            let segment = match raw.strip_prefix(PARAM_MARKER) {
                Some("") => return Err(PathError::invalid(path, "parameter without a name")),
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(raw.to_string()),
            };
            segments.push(segment);
        }

        check_unique_params(&segments, path)?;

        let query = match declaration {
            Some(declaration) => QuerySpec::parse(declaration, path)?,
            None => QuerySpec::default(),
        };

        Ok(Self { segments, query })
    }

    /// Appends `sub` below `self`.
    ///
    /// # Errors
    ///
    /// Fails with [`PathError::DuplicateParamName`] when both paths declare
    /// the same parameter, and [`PathError::DuplicateQueryKey`] when both
    /// declare the same query key.
    pub fn join(&self, sub: &Path) -> Result<Self, PathError> {
        let mut segments = Vec::with_capacity(self.segments.len() + sub.segments.len());
        segments.extend(self.segments.iter().cloned());
        segments.extend(sub.segments.iter().cloned());

        let display = format!("{self}{}", sub.route_string());
        check_unique_params(&segments, &display)?;
        let query = self.query.union(&sub.query, &display)?;

        Ok(Self { segments, query })
    }

    /// Matches a concrete request path and captures its parameters.
    ///
    /// Returns `None` when the segment count differs or a literal segment
    /// does not match. Any `?query` suffix on `request_path` is ignored and
    /// parameter values are percent-decoded.
    pub fn extract_params(&self, request_path: &str) -> Option<Params> {
        let request_path = request_path
            .split_once('?')
            .map_or(request_path, |(p, _)| p);

        let mut parts = request_path.split(DELIMITER).filter(|s| !s.is_empty());
        let mut params = Params::new();

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = urlencoding::decode(part)
                        .map_or_else(|_| part.to_string(), |v| v.into_owned());
                    params.push(name.clone(), value);
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }

        Some(params)
    }

    /// Returns true if `request_path` has this path's shape.
    pub fn matches(&self, request_path: &str) -> bool {
        self.extract_params(request_path).is_some()
    }

    /// Returns the segments in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the parameter names in order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(Segment::param_name)
    }

    /// Returns the typed query declaration.
    pub fn query(&self) -> &QuerySpec {
        &self.query
    }

    /// Returns true for `/`.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    fn route_string(&self) -> String {
        if self.segments.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push(DELIMITER);
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Param(name) => {
                    out.push(PARAM_MARKER);
                    out.push_str(name);
                }
            }
        }
        out
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            f.write_str("/")?;
        } else {
            f.write_str(&self.route_string())?;
        }
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn check_unique_params(segments: &[Segment], path: &str) -> Result<(), PathError> {
    let mut seen: Vec<&str> = Vec::new();
    for name in segments.iter().filter_map(Segment::param_name) {
        if seen.contains(&name) {
            return Err(PathError::DuplicateParamName {
                name: name.to_string(),
                path: path.to_string(),
            });
        }
        seen.push(name);
    }
    Ok(())
}
