//! Persistent middleware chains.
//!
//! A [`Chain`] is an ordered, immutable list of middleware units. Appending
//! or concatenating returns a new chain and leaves the original untouched,
//! so one base chain can seed several independent branches:
//!
//! ```
//! use apex_middleware::{Chain, FnMiddleware};
//!
//! let base = Chain::empty().append(FnMiddleware::new("log", |inv, next| Box::pin(next.run(inv))));
//! let admin = base.append(FnMiddleware::new("admin", |inv, next| Box::pin(next.run(inv))));
//! let public = base.append(FnMiddleware::new("cache", |inv, next| Box::pin(next.run(inv))));
//!
//! assert_eq!(base.names(), vec!["log"]);
//! assert_eq!(admin.names(), vec!["log", "admin"]);
//! assert_eq!(public.names(), vec!["log", "cache"]);
//! ```
//!
//! A chain has no behavior of its own; the dispatcher runs it through
//! [`Next::start`](crate::Next::start).

use crate::middleware::{Middleware, MiddlewareKind};
use std::fmt;
use std::sync::Arc;

/// A shared middleware unit.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An ordered, immutable sequence of middleware units.
#[derive(Clone)]
pub struct Chain {
    units: Arc<[BoxedMiddleware]>,
}

impl Chain {
    /// The identity chain: runs nothing and forwards to the endpoint.
    pub fn empty() -> Self {
        Self {
            units: Arc::from(Vec::new()),
        }
    }

    /// Returns a new chain with `unit` after every existing unit.
    #[must_use]
    pub fn append(&self, unit: impl Middleware) -> Self {
        self.append_shared(Arc::new(unit))
    }

    /// Like [`Chain::append`] for an already shared unit.
    #[must_use]
    pub fn append_shared(&self, unit: BoxedMiddleware) -> Self {
        let mut units = Vec::with_capacity(self.units.len() + 1);
        units.extend(self.units.iter().cloned());
        units.push(unit);
        Self {
            units: units.into(),
        }
    }

    /// Returns a new chain with every unit of `other` after those of `self`.
    #[must_use]
    pub fn concat(&self, other: &Chain) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut units = Vec::with_capacity(self.units.len() + other.units.len());
        units.extend(self.units.iter().cloned());
        units.extend(other.units.iter().cloned());
        Self {
            units: units.into(),
        }
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// True for the identity chain.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Unit names, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.units.iter().map(|u| u.name()).collect()
    }

    /// Iterates over the units in order.
    pub fn iter(&self) -> impl Iterator<Item = &BoxedMiddleware> {
        self.units.iter()
    }

    pub(crate) fn units(&self) -> &[BoxedMiddleware] {
        &self.units
    }

    /// Reports suspicious orderings. Never changes behavior.
    ///
    /// - a security unit placed after a non-security unit
    /// - a parser placed after a serializer
    pub fn diagnostics(&self) -> Vec<ChainWarning> {
        let mut warnings = Vec::new();
        let mut seen_non_security: Option<&'static str> = None;
        let mut seen_serializer: Option<&'static str> = None;

        for (index, unit) in self.units.iter().enumerate() {
            match unit.kind() {
                MiddlewareKind::Security => {
                    if let Some(before) = seen_non_security {
                        warnings.push(ChainWarning {
                            index,
                            unit: unit.name(),
                            message: format!("security middleware runs after '{before}'"),
                        });
                    }
                }
                kind => {
                    if seen_non_security.is_none() {
                        seen_non_security = Some(unit.name());
                    }
                    if kind == MiddlewareKind::Serializer && seen_serializer.is_none() {
                        seen_serializer = Some(unit.name());
                    }
                    if kind == MiddlewareKind::Parser {
                        if let Some(before) = seen_serializer {
                            warnings.push(ChainWarning {
                                index,
                                unit: unit.name(),
                                message: format!("parser middleware runs after serializer '{before}'"),
                            });
                        }
                    }
                }
            }
        }

        warnings
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// An ordering diagnostic produced by [`Chain::diagnostics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainWarning {
    /// Position of the offending unit.
    pub index: usize,
    /// Name of the offending unit.
    pub unit: &'static str,
    /// What looks wrong.
    pub message: String,
}

impl fmt::Display for ChainWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} '{}': {}", self.index, self.unit, self.message)
    }
}
