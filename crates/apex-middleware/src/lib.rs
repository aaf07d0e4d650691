//! # Apex Middleware
//!
//! Middleware chains for the Apex framework.
//!
//! A [`Chain`] is an immutable, ordered list of [`Middleware`] units.
//! Controllers and routes each hold one; the dispatcher concatenates them
//! root to leaf and runs the result for every matching request:
//!
//! ```text
//! controller chain → child controller chain → route chain → endpoint
//!                                                           (validate input,
//!                                                            handler,
//!                                                            validate output)
//! ```
//!
//! Each unit either calls [`Next::run`] (optionally adding to the context),
//! returns its own reply, or fails. Units are awaited strictly one after the
//! other; there is no fan-out within a request.
//!
//! ## Middleware kinds
//!
//! Every unit reports a [`MiddlewareKind`]. Kinds do not change how a unit
//! runs; [`Chain::diagnostics`] uses them to flag suspicious orderings such
//! as a security check placed after other middleware.
//!
//! ## Example
//!
//! ```
//! use apex_core::ContextPatch;
//! use apex_middleware::{Chain, FnMiddleware};
//! use serde_json::json;
//!
//! let chain = Chain::empty()
//!     .append(FnMiddleware::new("a", |inv, next| {
//!         Box::pin(next.run_with(inv, ContextPatch::new().set("a", json!(1))))
//!     }))
//!     .append(FnMiddleware::new("b", |inv, next| {
//!         Box::pin(next.run_with(inv, ContextPatch::new().set("b", json!(2))))
//!     }));
//!
//! assert_eq!(chain.names(), vec!["a", "b"]);
//! ```

#![doc(html_root_url = "https://docs.rs/apex-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod middleware;
pub mod stages;

// Re-export main types at crate root
pub use chain::{BoxedMiddleware, Chain, ChainWarning};
pub use middleware::{BoxFuture, Endpoint, FnMiddleware, Middleware, MiddlewareKind, Next};
