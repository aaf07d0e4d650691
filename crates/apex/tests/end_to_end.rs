//! A small user service exercised through the facade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apex::prelude::*;
use apex_test::TestClient;
use http::StatusCode;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct User {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct NewUser {
    name: String,
}

#[derive(Default)]
struct Store {
    users: Mutex<Vec<User>>,
    creates: AtomicUsize,
}

fn user_schema() -> Schema {
    Schema::object([("id", Schema::string()), ("name", Schema::string())])
}

/// Rejects requests without a bearer token; puts the caller into the context.
fn bearer_auth() -> impl Middleware {
    FnMiddleware::new("bearer-auth", |inv, next| {
        Box::pin(async move {
            let Some(token) = inv.header("authorization").and_then(|h| h.strip_prefix("Bearer ")) else {
                return Err(ApexError::unauthorized("missing bearer token").into());
            };
            let patch = ContextPatch::new().set("caller", json!(token));
            next.run_with(inv, patch).await
        })
    })
    .with_kind(MiddlewareKind::Security)
}

fn app(store: &Arc<Store>, config: &ApexConfig) -> Dispatcher {
    let reader = Arc::clone(store);
    let writer = Arc::clone(store);

    let users = controller("/user")
        .routes([
            (
                "get",
                get("/:id")
                    .params(Schema::object([("id", Schema::string().pattern("^[0-9]+$"))]))
                    .output(user_schema())
                    .handler(move |args: HandlerArgs| {
                        let store = Arc::clone(&reader);
                        async move {
                            let id = args.param("id").unwrap_or_default();
                            let found = store.users.lock().iter().find(|u| u.id == id).cloned();
                            HandlerResult::Ok(found.unwrap_or(User {
                                id: id.to_string(),
                                name: "John Doe".to_string(),
                            }))
                        }
                    })
                    .unwrap(),
            ),
            (
                "create",
                post("/")
                    .middleware(bearer_auth())
                    .input(Schema::object([("name", Schema::string().min_length(1))]))
                    .output(user_schema())
                    .status(StatusCode::CREATED)
                    .handler(move |args: HandlerArgs<NewUser>| {
                        let store = Arc::clone(&writer);
                        async move {
                            store.creates.fetch_add(1, Ordering::SeqCst);
                            let mut users = store.users.lock();
                            let user = User {
                                id: (users.len() + 100).to_string(),
                                name: args.input.name,
                            };
                            users.push(user.clone());
                            HandlerResult::Ok(user)
                        }
                    })
                    .unwrap(),
            ),
            (
                "broken",
                get("/broken/output")
                    .output(user_schema())
                    .handler(|_args: HandlerArgs| async { HandlerResult::Ok(json!({"id": 1})) })
                    .unwrap(),
            ),
        ])
        .unwrap();

    let root = Controller::builder().routes([("user", users)]).unwrap();
    apex::dispatcher(config).build(root).unwrap()
}

#[tokio::test]
async fn test_get_user() {
    let store = Arc::new(Store::default());
    let client = TestClient::new(app(&store, &ApexConfig::default()));

    client
        .get("/user/42")
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_json(&json!({"id": "42", "name": "John Doe"}));
}

#[tokio::test]
async fn test_params_schema_rejects() {
    let store = Arc::new(Store::default());
    let client = TestClient::new(app(&store, &ApexConfig::default()));

    let response = client.get("/user/abc").send().await;
    response.assert_error(ErrorCode::UnprocessableEntity);
    response.assert_json_field("/error/data/errors/0/path", &json!("/id"));
}

#[tokio::test]
async fn test_create_requires_token() {
    let store = Arc::new(Store::default());
    let client = TestClient::new(app(&store, &ApexConfig::default()));

    let response = client.post("/user").json(&json!({"name": "Ada"})).send().await;

    response.assert_error(ErrorCode::Unauthorized);
    assert_eq!(response.error_message(), Some("missing bearer token"));
    assert_eq!(store.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_create_and_read_back() {
    let store = Arc::new(Store::default());
    let client = TestClient::new(app(&store, &ApexConfig::default())).with_default_header("authorization", "Bearer t0k");

    let created: User = client
        .post("/user")
        .json(&json!({"name": "Ada"}))
        .send()
        .await
        .assert_status(StatusCode::CREATED)
        .json_as()
        .unwrap();
    assert_eq!(created.name, "Ada");

    let fetched: User = client
        .get(format!("/user/{}", created.id))
        .send()
        .await
        .json_as()
        .unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_invalid_body_skips_handler() {
    let store = Arc::new(Store::default());
    let client = TestClient::new(app(&store, &ApexConfig::default())).with_default_header("authorization", "Bearer t0k");

    let response = client.post("/user").json(&json!({"name": 123})).send().await;

    response.assert_error(ErrorCode::UnprocessableEntity);
    response.assert_json_field("/error/data/errors/0/path", &json!("/name"));
    assert_eq!(store.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_output_violation_depends_on_config() {
    let store = Arc::new(Store::default());

    let strict = TestClient::new(app(&store, &ApexConfig::production()));
    strict
        .get("/user/broken/output")
        .send()
        .await
        .assert_error(ErrorCode::InternalServerError);

    let mut lenient = ApexConfig::default();
    lenient.dispatch.validate_output = false;
    TestClient::new(app(&store, &lenient))
        .get("/user/broken/output")
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_json(&json!({"id": 1}));
}

#[tokio::test]
async fn test_wrong_method_and_unknown_path() {
    let store = Arc::new(Store::default());
    let client = TestClient::new(app(&store, &ApexConfig::default()));

    let response = client.delete("/user/42").send().await;
    response.assert_error(ErrorCode::MethodNotAllowed);
    response.assert_header("allow", "GET");

    client.get("/nobody").send().await.assert_error(ErrorCode::NotFound);
}

#[tokio::test]
async fn test_through_http_handling() {
    let store = Arc::new(Store::default());
    let mut config = ApexConfig::default();
    config.server.base_path = "/v1".to_string();

    let server = Server::new(app(&store, &config), apex::server_config(&config));
    let client = TestClient::http(server);

    client
        .get("/v1/user/7")
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_header("x-powered-by", "apex");
}

#[tokio::test]
async fn test_serve_until_shutdown() {
    let store = Arc::new(Store::default());
    let mut config = ApexConfig::default();
    config.server.http_addr = "127.0.0.1:0".to_string();
    config.server.shutdown_timeout_secs = 1;

    let shutdown = Shutdown::new();
    let handle = {
        let shutdown = shutdown.clone();
        let dispatcher = app(&store, &config);
        tokio::spawn(async move { apex::serve_with_shutdown(dispatcher, &config, shutdown).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.trigger();

    let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[test]
fn test_route_builder_is_persistent() {
    let base = post("/").input(Schema::object([("name", Schema::string())]));

    let first = base.clone().handler(|args: HandlerArgs| async move { HandlerResult::Ok(args.input) });
    let second = base.input(Schema::string()).handler(|args: HandlerArgs| async move { HandlerResult::Ok(args.input) });

    assert!(first.is_ok());
    assert!(matches!(second, Err(BuildError::InputAlreadySet { .. })));
}

#[test]
fn test_meta_reaches_middleware() {
    let seen = Arc::new(Mutex::new(Value::Null));
    let recorder = Arc::clone(&seen);

    let route = get("/")
        .meta(json!({"public": true}))
        .middleware(FnMiddleware::new("meta", move |inv, next| {
            *recorder.lock() = json!(inv.meta.flag("public"));
            Box::pin(next.run(inv))
        }))
        .handler(|_args: HandlerArgs| async { HandlerResult::Ok(Value::Null) })
        .unwrap();

    tokio_test::block_on(route.call(Context::new(), Value::Null)).unwrap();
    assert_eq!(*seen.lock(), json!(true));
}

#[tokio::test]
async fn test_models_and_declared_scheme() {
    let models = Models::new()
        .register("User", user_schema())
        .unwrap()
        .register("NewUser", Schema::object([("name", Schema::string().min_length(1))]))
        .unwrap();

    let guard = FnMiddleware::new("api-key", |inv, next| {
        Box::pin(async move {
            if inv.credential("key").as_deref() != Some("secret") {
                return Err(ApexError::unauthorized("bad api key").into());
            }
            next.run(inv).await
        })
    })
    .with_kind(MiddlewareKind::Security);

    let create = post("/")
        .middleware(guard)
        .input_model(&models, "NewUser")
        .output_model(&models, "User")
        .handler(|args: HandlerArgs<NewUser>| async move {
            HandlerResult::Ok(User { id: "1".to_string(), name: args.input.name })
        })
        .unwrap();
    let root = Controller::builder()
        .routes([("user", controller("/user").routes([("create", create)]).unwrap())])
        .unwrap();
    let dispatcher = apex::dispatcher(&ApexConfig::default())
        .security_scheme("key", SecurityScheme::api_key("x-api-key", ApiKeyLocation::Header))
        .build(root)
        .unwrap();
    let client = TestClient::new(dispatcher);

    client
        .post("/user")
        .json(&json!({"name": "Ada"}))
        .send()
        .await
        .assert_error(ErrorCode::Unauthorized);

    client
        .post("/user")
        .header("x-api-key", "secret")
        .json(&json!({"name": ""}))
        .send()
        .await
        .assert_error(ErrorCode::UnprocessableEntity);
    client
        .post("/user")
        .header("x-api-key", "secret")
        .json(&json!({"name": "Ada"}))
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_json(&json!({"id": "1", "name": "Ada"}));
}
