//! # Apex Test
//!
//! In-memory test client for Apex dispatchers: no sockets, no port binding.
//!
//! - [`TestClient`] - Sends requests to a [`Dispatcher`](apex_server::Dispatcher)
//!   or through a [`Server`](apex_server::Server)'s HTTP handling
//! - [`TestRequest`] - Fluent builder for headers, query pairs and bodies
//! - [`TestResponse`] - Status, headers and JSON body with assertion helpers
//!
//! ## Example
//!
//! ```ignore
//! use apex_test::TestClient;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_user() {
//!     let client = TestClient::new(app());
//!
//!     client
//!         .post("/user")
//!         .json(&json!({ "name": "Alice" }))
//!         .send()
//!         .await
//!         .assert_status(StatusCode::CREATED)
//!         .assert_json_field("/name", &json!("Alice"));
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/apex-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod response;

pub use client::{TestClient, TestRequest};
pub use error::TestError;
pub use response::TestResponse;
