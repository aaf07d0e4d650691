//! End-to-end chain execution tests.
//!
//! These tests drive whole chains through [`Next::start`] with a recording
//! endpoint standing in for the route handler, and check:
//!
//! 1. Short-circuit - a unit that replies stops everything after it
//! 2. Context additivity - patches accumulate and later keys overwrite
//! 3. Recovery - only a wrapping unit turns errors into replies

use apex_core::{ApexError, Context, ContextPatch, HandlerResult, Invocation, Reply};
use apex_middleware::stages::{RecoverMiddleware, RequireContextKey};
use apex_middleware::{BoxFuture, Chain, Endpoint, FnMiddleware, Middleware, Next};
use http::StatusCode;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

/// Endpoint that records its invocation and echoes the context.
struct Handler {
    log: Log,
}

impl Endpoint for Handler {
    fn call(&self, inv: Invocation) -> BoxFuture<'_, HandlerResult<Reply>> {
        Box::pin(async move {
            self.log.lock().push("handler".to_string());
            Ok(Reply::json(inv.ctx.to_json()))
        })
    }
}

/// A unit that records its name and continues.
fn step(name: &'static str, log: &Log) -> impl Middleware {
    let log = log.clone();
    FnMiddleware::new(name, move |inv, next| {
        log.lock().push(name.to_string());
        Box::pin(next.run(inv))
    })
}

/// A unit that adds `key = value` to the context.
fn add(name: &'static str, key: &'static str, value: Value) -> impl Middleware {
    FnMiddleware::new(name, move |inv, next| {
        Box::pin(next.run_with(inv, ContextPatch::new().set(key, value.clone())))
    })
}

async fn run(chain: &Chain, log: &Log) -> HandlerResult<Reply> {
    let handler = Handler { log: log.clone() };
    Next::start(chain, &handler)
        .run(Invocation::new(Context::new(), Value::Null))
        .await
}

#[tokio::test]
async fn test_short_circuit_skips_rest_of_chain() {
    let log: Log = Arc::default();
    let chain = Chain::empty()
        .append(step("one", &log))
        .append({
            let log = log.clone();
            FnMiddleware::new("two", move |_inv, _next| {
                log.lock().push("two".to_string());
                Box::pin(async {
                    Ok(Reply::json(json!({"cached": true})).with_status(StatusCode::ACCEPTED))
                })
            })
        })
        .append(step("three", &log));

    let reply = run(&chain, &log).await.unwrap();

    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(reply.body, json!({"cached": true}));
    assert_eq!(*log.lock(), vec!["one", "two"]);
}

#[tokio::test]
async fn test_context_patches_accumulate() {
    let log: Log = Arc::default();
    let chain = Chain::empty()
        .append(add("a", "a", json!(1)))
        .append(add("b", "b", json!(2)));

    let reply = run(&chain, &log).await.unwrap();
    assert_eq!(reply.body, json!({"a": 1, "b": 2}));
}

#[tokio::test]
async fn test_later_patch_overwrites() {
    let log: Log = Arc::default();
    let chain = Chain::empty()
        .append(add("a", "a", json!(1)))
        .append(add("b", "b", json!(2)))
        .append(add("a2", "a", json!(2)));

    let reply = run(&chain, &log).await.unwrap();
    assert_eq!(reply.body["a"], json!(2));
    assert_eq!(reply.body["b"], json!(2));
}

#[tokio::test]
async fn test_error_without_recovery_propagates() {
    let log: Log = Arc::default();
    let chain = Chain::empty()
        .append(RequireContextKey::new("user"))
        .append(step("after", &log));

    let err = run(&chain, &log).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_recovery_wraps_downstream_errors() {
    let log: Log = Arc::default();
    let chain = Chain::empty()
        .append(RecoverMiddleware::new(|err| {
            Ok(Reply::json(json!({"recovered": err.status().as_u16()})))
        }))
        .append(FnMiddleware::new("fail", |_inv, _next| {
            Box::pin(async { Err(ApexError::conflict("taken").into()) })
        }));

    let reply = run(&chain, &log).await.unwrap();
    assert_eq!(reply.body, json!({"recovered": 409}));
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_sibling_chains_from_shared_base() {
    let log: Log = Arc::default();
    let base = Chain::empty().append(step("base", &log));
    let left = base.append(step("left", &log));
    let right = base.append(step("right", &log));

    run(&left, &log).await.unwrap();
    run(&right, &log).await.unwrap();

    assert_eq!(
        *log.lock(),
        vec!["base", "left", "handler", "base", "right", "handler"]
    );
}
