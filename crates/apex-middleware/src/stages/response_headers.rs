//! Fixed response headers.

use crate::middleware::{BoxFuture, Middleware, MiddlewareKind, Next};
use apex_core::{HandlerResult, Invocation, Reply};
use http::header::{HeaderName, HeaderValue};

/// Stamps a fixed set of headers onto every successful reply.
///
/// Headers already set further down the chain win.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl ResponseHeaders {
    /// Creates an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }
}

impl Middleware for ResponseHeaders {
    fn name(&self) -> &'static str {
        "response_headers"
    }

    fn kind(&self) -> MiddlewareKind {
        MiddlewareKind::Serializer
    }

    fn process<'a>(&'a self, inv: Invocation, next: Next<'a>) -> BoxFuture<'a, HandlerResult<Reply>> {
        Box::pin(async move {
            let mut reply = next.run(inv).await?;
            for (name, value) in &self.headers {
                if !reply.headers.contains_key(name) {
                    reply.headers.insert(name.clone(), value.clone());
                }
            }
            Ok(reply)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Endpoint;
    use crate::Chain;
    use apex_core::Context;
    use http::header::CACHE_CONTROL;
    use serde_json::Value;

    struct WithHeader;

    impl Endpoint for WithHeader {
        fn call(&self, _inv: Invocation) -> BoxFuture<'_, HandlerResult<Reply>> {
            Box::pin(async { Ok(Reply::json(Value::Null).with_header("x-own", "handler")) })
        }
    }

    #[tokio::test]
    async fn test_headers_added_without_overriding() {
        let chain = Chain::empty().append(
            ResponseHeaders::new()
                .header(CACHE_CONTROL, HeaderValue::from_static("no-store"))
                .header(
                    HeaderName::from_static("x-own"),
                    HeaderValue::from_static("middleware"),
                ),
        );

        let reply = Next::start(&chain, &WithHeader)
            .run(apex_core::Invocation::new(Context::new(), Value::Null))
            .await
            .unwrap();

        assert_eq!(reply.headers.get(CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(reply.headers.get("x-own").unwrap(), "handler");
    }
}
