//! Test client for in-memory testing.

use std::sync::Arc;

use apex_core::{Body, Request, Signal};
use apex_server::{Dispatcher, Server};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method};
use http_body_util::{BodyExt, Full};
use serde::Serialize;

use crate::error::TestError;
use crate::response::TestResponse;

enum Backend {
    Dispatcher(Arc<Dispatcher>),
    Server(Arc<Server>),
}

/// A test client for making in-memory requests.
///
/// [`TestClient::new`] hands requests straight to a [`Dispatcher`];
/// [`TestClient::http`] runs them through the HTTP host's request handling
/// (base path, body decoding, limits) without binding a port.
///
/// # Example
///
/// ```
/// use apex_core::HandlerResult;
/// use apex_server::{controller, get, Dispatcher, HandlerArgs};
/// use apex_test::TestClient;
/// use http::StatusCode;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let ping = get("/")
///     .handler(|_args: HandlerArgs| async { HandlerResult::Ok("pong") })
///     .unwrap();
/// let dispatcher = Dispatcher::builder()
///     .build(controller("/ping").routes([("ping", ping)]).unwrap())
///     .unwrap();
///
/// let client = TestClient::new(dispatcher);
/// client
///     .get("/ping")
///     .send()
///     .await
///     .assert_status(StatusCode::OK)
///     .assert_json(&json!("pong"));
/// # });
/// ```
#[must_use]
pub struct TestClient {
    backend: Backend,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Creates a client that dispatches directly.
    pub fn new(dispatcher: impl Into<Arc<Dispatcher>>) -> Self {
        Self {
            backend: Backend::Dispatcher(dispatcher.into()),
            default_headers: Vec::new(),
        }
    }

    /// Creates a client that goes through the server's HTTP handling.
    pub fn http(server: Server) -> Self {
        Self {
            backend: Backend::Server(Arc::new(server)),
            default_headers: Vec::new(),
        }
    }

    /// Adds a header sent with every request.
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Creates a GET request.
    pub fn get(&self, path: impl AsRef<str>) -> TestRequest<'_> {
        self.request(Method::GET, path)
    }

    /// Creates a POST request.
    pub fn post(&self, path: impl AsRef<str>) -> TestRequest<'_> {
        self.request(Method::POST, path)
    }

    /// Creates a PUT request.
    pub fn put(&self, path: impl AsRef<str>) -> TestRequest<'_> {
        self.request(Method::PUT, path)
    }

    /// Creates a PATCH request.
    pub fn patch(&self, path: impl AsRef<str>) -> TestRequest<'_> {
        self.request(Method::PATCH, path)
    }

    /// Creates a DELETE request.
    pub fn delete(&self, path: impl AsRef<str>) -> TestRequest<'_> {
        self.request(Method::DELETE, path)
    }

    /// Creates a request with any method.
    pub fn request(&self, method: Method, path: impl AsRef<str>) -> TestRequest<'_> {
        let mut request = TestRequest {
            client: self,
            method,
            path: path.as_ref().to_string(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: Body::Empty,
            error: None,
        };
        for (name, value) in &self.default_headers {
            request = request.header(name, value);
        }
        request
    }

    async fn execute(&self, request: Request) -> Result<TestResponse, TestError> {
        match &self.backend {
            Backend::Dispatcher(dispatcher) => Ok(TestResponse::from_reply(dispatcher.dispatch(request).await)),
            Backend::Server(server) => {
                let http_request = into_http_request(request)?;
                let response = server.handle(http_request, Signal::new()).await;
                let (parts, body) = response.into_parts();
                let bytes = match body.collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(never) => match never {},
                };
                TestResponse::from_bytes(parts.status, parts.headers, &bytes)
            }
        }
    }
}

/// Encodes a dispatcher request as an HTTP request, JSON bodies included.
fn into_http_request(request: Request) -> Result<http::Request<Full<Bytes>>, TestError> {
    let mut uri = request.path;
    if !request.query.is_empty() {
        let query: Vec<String> = request
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        uri.push(if uri.contains('?') { '&' } else { '?' });
        uri.push_str(&query.join("&"));
    }

    let mut headers = request.headers;
    let body = match request.body {
        Body::Empty => Bytes::new(),
        Body::Raw(bytes) => bytes,
        Body::Json(value) => {
            headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
            Bytes::from(serde_json::to_vec(&value)?)
        }
    };

    let mut builder = http::Request::builder().method(request.method).uri(uri);
    if let Some(target) = builder.headers_mut() {
        *target = headers;
    }
    builder
        .body(Full::new(body))
        .map_err(|e| TestError::RequestBuild(e.to_string()))
}

/// A request bound to a [`TestClient`].
#[must_use]
pub struct TestRequest<'a> {
    client: &'a TestClient,
    method: Method,
    path: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Body,
    error: Option<TestError>,
}

impl TestRequest<'_> {
    /// Adds a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        match (
            HeaderName::try_from(name),
            HeaderValue::try_from(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => {
                self.error
                    .get_or_insert_with(|| TestError::InvalidHeader(name.to_string()));
            }
        }
        self
    }

    /// Sets the Authorization header with a Bearer token.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("authorization", value)
    }

    /// Adds a query pair.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets the body as JSON.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => self.body = Body::Json(value),
            Err(e) => {
                self.error.get_or_insert(TestError::Json(e));
            }
        }
        self
    }

    /// Sets a raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::Raw(body.into());
        self
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics if the request could not be built; use
    /// [`try_send`](Self::try_send) to handle that.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("test request failed: {e}"),
        }
    }

    /// Sends the request.
    ///
    /// # Errors
    ///
    /// Returns the first error recorded while building the request, or a
    /// decoding error for a non-JSON HTTP response.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let mut request = Request::new(self.method, self.path).with_body(self.body);
        request.headers = self.headers;
        request.query = self.query;
        self.client.execute(request).await
    }
}
