//! Route path model for Apex.
//!
//! Paths are parsed once, when a route or controller is defined, into an
//! immutable sequence of literal and parameter segments. The dispatcher then
//! matches concrete request paths against them positionally.
//!
//! # Features
//!
//! - **Named Parameters**: `:id` segments are captured into [`Params`]
//! - **Composition**: [`Path::join`] nests a route under a controller prefix
//! - **Typed Query Declarations**: `/search?page=int&tags=[string]`
//!
//! # Example
//!
//! ```rust
//! use apex_router::Path;
//!
//! let base = Path::parse("/orgs/:org").unwrap();
//! let route = base.join(&Path::parse("/users/:id").unwrap()).unwrap();
//! assert_eq!(route.to_string(), "/orgs/:org/users/:id");
//!
//! let params = route.extract_params("/orgs/acme/users/42").unwrap();
//! assert_eq!(params.get("org"), Some("acme"));
//! assert_eq!(params.get("id"), Some("42"));
//!
//! // Different segment count: no match.
//! assert!(route.extract_params("/orgs/acme/users").is_none());
//! ```

#![doc(html_root_url = "https://docs.rs/apex-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod params;
mod path;
mod query;

pub use error::{PathError, QueryError};
pub use params::Params;
pub use path::{Path, Segment};
pub use query::{QueryKind, QuerySpec};
