//! # Apex Server
//!
//! Route and controller builders, the dispatcher that executes them, and a
//! Hyper host that feeds it HTTP requests.
//!
//! - [`get`], [`post`], ... / [`RouteBuilder`] - Persistent route builder ending in [`Route`]
//! - [`controller`] / [`ControllerBuilder`] - Path-scoped groups of routes and controllers
//! - [`Dispatcher`] - Flattens a controller tree and serves [`Request`](apex_core::Request)s
//! - [`Server`] - HTTP/1.1 host with graceful shutdown
//!
//! ## Example
//!
//! ```rust
//! use apex_core::{HandlerResult, Request};
//! use apex_server::{controller, get, Dispatcher, HandlerArgs};
//! use http::Method;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let users = controller("/user")
//!     .routes([(
//!         "get",
//!         get("/:id")
//!             .handler(|args: HandlerArgs| async move {
//!                 HandlerResult::Ok(json!({ "id": args.param("id"), "name": "John Doe" }))
//!             })
//!             .unwrap(),
//!     )])
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::builder().build(users).unwrap();
//! let reply = dispatcher.dispatch(Request::new(Method::GET, "/user/42")).await;
//!
//! assert_eq!(reply.body, json!({ "id": "42", "name": "John Doe" }));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/apex-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod controller;
mod dispatcher;
mod error;
mod route;
mod server;
pub mod shutdown;

pub use config::{
    ServerConfig, ServerConfigBuilder, DEFAULT_HTTP_ADDR, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
pub use controller::{controller, Controller, ControllerBuilder, RouteNode};
pub use dispatcher::{
    error_reply, request_id_of, DispatchOptions, Dispatcher, DispatcherBuilder, REQUEST_ID_HEADER,
};
pub use error::BuildError;
pub use route::{all, delete, get, patch, post, put, route, HandlerArgs, Route, RouteBuilder};
pub use server::{HttpResponse, ResponseBody, Server, ServerError, POWERED_BY};
pub use shutdown::Shutdown;
