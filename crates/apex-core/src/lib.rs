//! # Apex Core
//!
//! Core types shared by every Apex crate.
//!
//! - [`ApexError`] / [`ErrorCode`] - Intentional errors with a fixed status table
//! - [`HandlerError`] - What middleware and handlers return on failure
//! - [`Context`] / [`ContextPatch`] - Per-request state with overwrite-merge semantics
//! - [`Invocation`] - Everything a middleware unit sees about a request
//! - [`Request`] / [`Reply`] - The host-facing request descriptor and terminal result
//! - [`schema`] - Schema descriptors compiled once into shareable validators
//! - [`Models`] - Named validators that routes reference by name
//! - [`SecurityScheme`] - Declared authentication schemes middleware can look up

#![doc(html_root_url = "https://docs.rs/apex-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod invocation;
mod models;
mod request;
pub mod schema;
mod security;

pub use apex_router::Params;
pub use context::{Context, ContextPatch, RequestId};
pub use error::{
    ApexError, ErrorCode, ErrorDetail, ErrorEnvelope, HandlerError, HandlerResult,
    UnknownErrorCode,
};
pub use invocation::{Invocation, Meta, Signal};
pub use models::Models;
pub use request::{Body, Reply, Request};
pub use schema::{IntoValidator, Schema, SchemaError, Validate, ValidationError, ValidationErrors, Validator};
pub use security::{ApiKeyLocation, OAuthFlow, OAuthFlows, SecurityScheme, SecuritySchemes};
