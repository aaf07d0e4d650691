//! HTTP host.
//!
//! Binds a TCP listener, serves HTTP/1.1 connections with Hyper and hands
//! each request to a [`Dispatcher`]. The host owns everything the
//! dispatcher does not: reading the body under a size limit and a timeout,
//! JSON decoding, query string parsing, stripping the base path, the
//! request timeout, and graceful shutdown.
//!
//! # Example
//!
//! ```rust,no_run
//! use apex_core::HandlerResult;
//! use apex_server::{controller, get, Dispatcher, HandlerArgs, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ping = get("/").handler(|_args: HandlerArgs| async { HandlerResult::Ok("pong") })?;
//!     let dispatcher = Dispatcher::builder().build(controller("/ping").routes([("ping", ping)])?)?;
//!
//!     let config = ServerConfig::builder().http_addr("127.0.0.1:3000").build();
//!     Server::new(dispatcher, config).run().await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use apex_core::{ApexError, Body, ErrorCode, Reply, Request, RequestId, Signal};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::dispatcher::{error_reply, Dispatcher, REQUEST_ID_HEADER};
use crate::shutdown::{ConnectionTracker, Shutdown};

/// Type alias for HTTP response body.
pub type ResponseBody = Full<Bytes>;

/// Type alias for the HTTP response.
pub type HttpResponse = Response<ResponseBody>;

/// Value of the `x-powered-by` header.
pub const POWERED_BY: &str = "apex";

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("bind error: {0}")]
    BindError(String),

    /// An I/O error outside a single connection.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// The Apex HTTP server.
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Creates a server for `dispatcher`.
    pub fn new(dispatcher: impl Into<Arc<Dispatcher>>, config: ServerConfig) -> Self {
        Self {
            config,
            dispatcher: dispatcher.into(),
        }
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The dispatcher requests are handed to.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Runs until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(Shutdown::with_os_signals()).await
    }

    /// Binds the configured address and runs until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: Shutdown) -> Result<(), ServerError> {
        let addr = self.config.socket_addr().map_err(|e| {
            ServerError::BindError(format!("Invalid address '{}': {}", self.config.http_addr(), e))
        })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {addr}: {e}")))?;

        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// fires, then drains open connections for up to the shutdown timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's address cannot be read.
    pub async fn serve(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), ServerError> {
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, base_path = self.config.base_path(), "Server listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            let server = Arc::clone(&server);
                            let token = tracker.acquire();
                            let shutdown = shutdown.clone();

                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, remote_addr, shutdown).await {
                                    tracing::debug!("Connection error from {}: {}", remote_addr, e);
                                }
                                drop(token);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                () = shutdown.wait() => {
                    tracing::info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        let shutdown_timeout = server.config.shutdown_timeout();
        tracing::info!(
            "Waiting up to {:?} for {} connections to close",
            shutdown_timeout,
            tracker.active_connections()
        );

        tokio::select! {
            () = tracker.wait_idle() => {
                tracing::info!("All connections closed");
            }
            () = tokio::time::sleep(shutdown_timeout) => {
                tracing::warn!(
                    "Shutdown timeout reached, {} connections still active",
                    tracker.active_connections()
                );
            }
        }

        tracing::info!("Server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        remote_addr: SocketAddr,
        shutdown: Shutdown,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(self);
        let requests = shutdown.clone();

        let service = service_fn(move |req: hyper::Request<Incoming>| {
            let server = Arc::clone(&server);
            let signal = Signal::from_token(requests.child_token());
            async move { Ok::<_, Infallible>(server.handle(req, signal).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.wait() => {
                tracing::debug!("Draining connection from {}", remote_addr);
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    /// Handles one HTTP request. Never fails; every problem becomes an
    /// error envelope.
    pub async fn handle<B>(&self, req: hyper::Request<B>, signal: Signal) -> HttpResponse
    where
        B: hyper::body::Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let started = Instant::now();
        let (mut parts, body) = req.into_parts();
        let method = parts.method.clone();
        let uri_path = parts.uri.path().to_string();

        let request_id = assign_request_id(&mut parts.headers);

        let reply = match self.read_request(parts, body).await {
            Ok(request) => {
                let dispatch = self.dispatcher.dispatch_with_signal(request, signal.clone());
                if let Ok(reply) = tokio::time::timeout(self.config.request_timeout(), dispatch).await {
                    reply
                } else {
                    signal.cancel();
                    tracing::warn!(request_id = %request_id, "Handler execution timed out for {} {}", method, uri_path);
                    error_reply(&ApexError::gateway_timeout("request timed out"), request_id)
                }
            }
            Err(err) => {
                tracing::debug!(request_id = %request_id, code = %err.code(), "Rejected before dispatch");
                error_reply(&err, request_id)
            }
        };

        tracing::debug!(
            request_id = %request_id,
            status = reply.status.as_u16(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "{} {}",
            method,
            uri_path
        );

        into_response(reply)
    }

    /// Turns the HTTP request into a dispatcher request.
    async fn read_request<B>(&self, parts: http::request::Parts, body: B) -> Result<Request, ApexError>
    where
        B: hyper::body::Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = strip_base_path(self.config.base_path(), parts.uri.path())
            .ok_or_else(|| ApexError::not_found(format!("no route for {}", parts.uri.path())))?;

        let query = match parts.uri.query() {
            Some(raw) => serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
                .map_err(|e| ApexError::bad_request(format!("malformed query string: {e}")))?,
            None => Vec::new(),
        };

        let bytes = tokio::time::timeout(
            self.config.request_timeout(),
            collect_body(body, self.config.max_body_bytes()),
        )
        .await
        .map_err(|_| ApexError::gateway_timeout("timed out reading the request body"))??;

        let body = decode_body(&parts.headers, bytes)?;

        Ok(Request {
            method: parts.method,
            path,
            headers: parts.headers,
            query,
            body,
        })
    }
}

/// Reuses a valid incoming request id or stamps a new one on the headers,
/// so the dispatcher and the host agree on it.
fn assign_request_id(headers: &mut http::HeaderMap) -> RequestId {
    let incoming = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<RequestId>().ok());

    incoming.unwrap_or_else(|| {
        let id = RequestId::new();
        if let Ok(value) = HeaderValue::try_from(id.to_string()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        id
    })
}

/// Collects the request body, enforcing `limit`.
async fn collect_body<B>(body: B, limit: usize) -> Result<Bytes, ApexError>
where
    B: hyper::body::Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(ApexError::new(
            ErrorCode::PayloadTooLarge,
            format!("request body exceeds {limit} bytes"),
        )),
        Err(e) => Err(ApexError::bad_request(format!("Failed to read request body: {e}"))),
    }
}

/// Parses JSON bodies; anything else is passed on raw.
fn decode_body(headers: &http::HeaderMap, bytes: Bytes) -> Result<Body, ApexError> {
    if bytes.is_empty() {
        return Ok(Body::Empty);
    }

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .is_some_and(|mime| mime == "application/json" || mime.ends_with("+json"));

    if is_json {
        serde_json::from_slice(&bytes)
            .map(Body::Json)
            .map_err(|e| ApexError::bad_request(format!("malformed JSON body: {e}")))
    } else {
        Ok(Body::Raw(bytes))
    }
}

/// Strips `base` from `path`. `None` when the path is outside the base.
fn strip_base_path(base: &str, path: &str) -> Option<String> {
    if base == "/" {
        return Some(path.to_string());
    }
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

fn into_response(reply: Reply) -> HttpResponse {
    let body = if reply.status == StatusCode::NO_CONTENT {
        Bytes::new()
    } else {
        Bytes::from(serde_json::to_vec(&reply.body).unwrap_or_default())
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = reply.status;
    *response.headers_mut() = reply.headers;

    let headers = response.headers_mut();
    if reply.status != StatusCode::NO_CONTENT {
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
    }
    headers.insert("x-powered-by", HeaderValue::from_static(POWERED_BY));
    response
}
