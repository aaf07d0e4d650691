//! Request dispatcher.
//!
//! [`DispatcherBuilder::build`] flattens a controller tree once: every route
//! gets its full path (parent paths joined root to leaf) and its full chain
//! (controller chains root to leaf, then the route's own chain). Per request
//! the dispatcher:
//!
//! 1. resolves the request id from `x-request-id` or generates one,
//! 2. finds the first route, in construction order, whose path and method
//!    match (`404` when no path matches, `405` with `Allow` when only the
//!    method is wrong),
//! 3. coerces the query against the route's declaration (`400` on failure),
//! 4. asks the context factory for a fresh context,
//! 5. runs the chain, ending in input validation, the handler and output
//!    validation,
//! 6. turns any error into an envelope.
//!
//! [`Dispatcher::dispatch`] never fails.

use crate::controller::{Controller, RouteNode};
use crate::error::BuildError;
use crate::route::Route;
use apex_core::{
    ApexError, Context, HandlerError, HandlerResult, Invocation, Params, Reply, Request, RequestId,
    SecurityScheme, SecuritySchemes, Signal,
};
use apex_middleware::{BoxFuture, Chain, Next};
use apex_router::Path;
use http::header::{HeaderValue, ALLOW};
use http::Method;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

/// Header carrying the request id, both ways.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

type ContextFactory = Arc<dyn Fn(&Request) -> BoxFuture<'static, HandlerResult<Context>> + Send + Sync>;

/// Dispatch behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Validate handler output against the route's output schema.
    pub validate_output: bool,
    /// Include the message of unexpected errors in responses.
    pub expose_internal_errors: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            validate_output: true,
            expose_internal_errors: false,
        }
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    factory: ContextFactory,
    options: DispatchOptions,
    schemes: SecuritySchemes,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self {
            factory: Arc::new(|_req: &Request| Box::pin(async { Ok(Context::new()) })),
            options: DispatchOptions::default(),
            schemes: SecuritySchemes::new(),
        }
    }

    /// Sets the per-request context factory.
    ///
    /// Called exactly once per matched request, before the chain runs. An
    /// error from the factory is answered like a handler error.
    #[must_use]
    pub fn context_factory<F, Fut>(mut self, factory: F) -> Self
    where
        F: Fn(&Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Context>> + Send + 'static,
    {
        self.factory = Arc::new(move |req: &Request| Box::pin(factory(req)));
        self
    }

    /// Replaces all options.
    #[must_use]
    pub fn options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Toggles output validation.
    #[must_use]
    pub fn validate_output(mut self, enabled: bool) -> Self {
        self.options.validate_output = enabled;
        self
    }

    /// Toggles exposing unexpected error messages.
    #[must_use]
    pub fn expose_internal_errors(mut self, enabled: bool) -> Self {
        self.options.expose_internal_errors = enabled;
        self
    }

    /// Declares the authentication scheme `name`. Middleware read it back
    /// from [`Invocation::schemes`]; a later declaration of the same name
    /// replaces the earlier one.
    #[must_use]
    pub fn security_scheme(mut self, name: impl Into<String>, scheme: SecurityScheme) -> Self {
        self.schemes = self.schemes.with(name, scheme);
        self
    }

    /// Replaces all declared authentication schemes.
    #[must_use]
    pub fn security_schemes(mut self, schemes: SecuritySchemes) -> Self {
        self.schemes = schemes;
        self
    }

    /// Flattens `root` and builds the dispatcher.
    ///
    /// # Errors
    ///
    /// Fails when joining nested paths repeats a parameter name or query
    /// key.
    pub fn build(self, root: Controller) -> Result<Dispatcher, BuildError> {
        let mut routes = Vec::new();
        flatten(&root, &Path::root(), &Chain::empty(), "", &mut routes)?;

        for entry in &routes {
            for warning in entry.chain.diagnostics() {
                tracing::warn!(route = %entry.name, %warning, "suspicious middleware order");
            }
            tracing::debug!(
                route = %entry.name,
                method = entry.route.method().map_or("*", Method::as_str),
                path = %entry.path,
                middleware = entry.chain.len(),
                "route registered"
            );
        }

        for (name, scheme) in self.schemes.iter() {
            tracing::debug!(scheme = name, credential = scheme.credential_name(), "security scheme declared");
        }

        Ok(Dispatcher {
            routes,
            factory: self.factory,
            options: self.options,
            schemes: self.schemes,
        })
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("options", &self.options)
            .field("schemes", &self.schemes.len())
            .finish_non_exhaustive()
    }
}

fn flatten(
    node: &Controller,
    prefix: &Path,
    chain: &Chain,
    key_prefix: &str,
    out: &mut Vec<CompiledRoute>,
) -> Result<(), BuildError> {
    let path = prefix.join(node.path())?;
    let chain = chain.concat(node.chain());

    for (key, child) in node.routes() {
        let name = if key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{key_prefix}.{key}")
        };
        match child {
            RouteNode::Route(route) => out.push(CompiledRoute {
                path: path.join(route.path())?,
                chain: chain.concat(route.chain()),
                route: route.clone(),
                name,
            }),
            RouteNode::Controller(sub) => flatten(sub, &path, &chain, &name, out)?,
        }
    }
    Ok(())
}

/// A route with its full path and chain.
struct CompiledRoute {
    name: String,
    path: Path,
    chain: Chain,
    route: Route,
}

enum Resolution<'a> {
    Found(&'a CompiledRoute, Params),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// Executes requests against a frozen controller tree.
///
/// Shared read-only between requests; wrap it in an `Arc` to serve
/// concurrently.
pub struct Dispatcher {
    routes: Vec<CompiledRoute>,
    factory: ContextFactory,
    options: DispatchOptions,
    schemes: SecuritySchemes,
}

impl Dispatcher {
    /// Starts a builder with an empty-context factory and default options.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// The options in effect.
    pub fn options(&self) -> DispatchOptions {
        self.options
    }

    /// The declared authentication schemes.
    pub fn security_schemes(&self) -> &SecuritySchemes {
        &self.schemes
    }

    /// Registered routes as `(name, method, full path)`, in matching order.
    /// Names are the dotted route keys from the root.
    pub fn routes(&self) -> impl Iterator<Item = (&str, Option<&Method>, &Path)> {
        self.routes
            .iter()
            .map(|entry| (entry.name.as_str(), entry.route.method(), &entry.path))
    }

    /// Handles one request.
    pub async fn dispatch(&self, request: Request) -> Reply {
        self.dispatch_with_signal(request, Signal::new()).await
    }

    /// Handles one request, threading `signal` to middleware and handler.
    pub async fn dispatch_with_signal(&self, mut request: Request, signal: Signal) -> Reply {
        let request_id = request_id_of(&request);
        split_query(&mut request);

        let span = tracing::debug_span!(
            "dispatch",
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
            route = tracing::field::Empty,
        );

        let mut reply = async {
            match self.resolve(&request.method, &request.path) {
                Resolution::Found(entry, params) => {
                    tracing::Span::current().record("route", entry.name.as_str());
                    match self.execute(entry, params, request, request_id, signal).await {
                        Ok(reply) => reply,
                        Err(err) => self.error_reply(err, request_id),
                    }
                }
                Resolution::MethodNotAllowed(allowed) => {
                    let allow = allowed
                        .iter()
                        .map(Method::as_str)
                        .collect::<Vec<_>>()
                        .join(", ");
                    let err = ApexError::method_not_allowed(format!(
                        "{} is not allowed on {}",
                        request.method, request.path
                    ));
                    let mut reply = self.error_reply(err.into(), request_id);
                    if let Ok(value) = HeaderValue::try_from(allow) {
                        reply.headers.insert(ALLOW, value);
                    }
                    reply
                }
                Resolution::NotFound => {
                    let err = ApexError::not_found(format!("no route for {}", request.path));
                    self.error_reply(err.into(), request_id)
                }
            }
        }
        .instrument(span)
        .await;

        if let Ok(value) = HeaderValue::try_from(request_id.to_string()) {
            reply.headers.insert(REQUEST_ID_HEADER, value);
        }
        reply
    }

    fn resolve(&self, method: &Method, path: &str) -> Resolution<'_> {
        let mut allowed: Vec<Method> = Vec::new();

        for entry in &self.routes {
            let Some(params) = entry.path.extract_params(path) else {
                continue;
            };
            if entry.route.accepts(method) {
                return Resolution::Found(entry, params);
            }
            if let Some(m) = entry.route.method() {
                if !allowed.contains(m) {
                    allowed.push(m.clone());
                }
            }
        }

        if allowed.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::MethodNotAllowed(allowed)
        }
    }

    async fn execute(
        &self,
        entry: &CompiledRoute,
        params: Params,
        request: Request,
        request_id: RequestId,
        signal: Signal,
    ) -> HandlerResult<Reply> {
        let query = entry
            .path
            .query()
            .coerce(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map_err(|err| ApexError::bad_request(err.to_string()))?;

        let ctx = (self.factory)(&request).await?;

        let inv = Invocation {
            request_id,
            input: request.body.to_value(),
            method: request.method,
            path: request.path,
            headers: request.headers,
            ctx,
            params,
            query,
            meta: entry.route.meta().clone(),
            signal,
            schemes: self.schemes.clone(),
        };

        let endpoint = entry.route.endpoint(self.options.validate_output);
        Next::start(&entry.chain, &endpoint).run(inv).await
    }

    fn error_reply(&self, err: HandlerError, request_id: RequestId) -> Reply {
        match &err {
            HandlerError::Unexpected(cause) => {
                tracing::error!(request_id = %request_id, error = %format!("{cause:#}"), "unexpected error");
            }
            HandlerError::Apex(apex) if apex.status().is_server_error() => {
                tracing::error!(request_id = %request_id, code = %apex.code(), detail = apex.message(), "request failed");
            }
            HandlerError::Apex(apex) => {
                tracing::warn!(request_id = %request_id, code = %apex.code(), detail = apex.message(), "request rejected");
            }
        }
        error_reply(&err.into_client_error(self.options.expose_internal_errors), request_id)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.len())
            .field("options", &self.options)
            .field("schemes", &self.schemes.len())
            .finish_non_exhaustive()
    }
}

/// Renders an error as an envelope reply.
pub fn error_reply(err: &ApexError, request_id: RequestId) -> Reply {
    let id = request_id.to_string();
    let body = serde_json::to_value(err.to_envelope(Some(&id))).unwrap_or_default();
    let mut reply = Reply::json(body).with_status(err.status());
    if let Ok(value) = HeaderValue::try_from(id) {
        reply.headers.insert(REQUEST_ID_HEADER, value);
    }
    reply
}

/// The request id from the `x-request-id` header, or a new one.
pub fn request_id_of(request: &Request) -> RequestId {
    request
        .header(REQUEST_ID_HEADER)
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

/// Moves a `?query` suffix of the path into the query pairs.
fn split_query(request: &mut Request) {
    if let Some((path, query)) = request.path.split_once('?') {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
        let path = path.to_string();
        request.path = path;
        request.query.extend(pairs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::controller;
    use crate::route::{get, post, HandlerArgs};
    use apex_core::{ContextPatch, ErrorCode};
    use apex_middleware::FnMiddleware;
    use http::StatusCode;
    use serde_json::{json, Value};

    fn dispatcher(root: Controller) -> Dispatcher {
        Dispatcher::builder().build(root).unwrap()
    }

    fn ok(tag: &'static str) -> Route {
        at("/", tag)
    }

    fn at(path: &str, tag: &'static str) -> Route {
        get(path)
            .handler(move |_args: HandlerArgs| async move { HandlerResult::Ok(json!(tag)) })
            .unwrap()
    }

    #[tokio::test]
    async fn test_nested_paths_are_joined() {
        let inner = controller("/:id").routes([("show", ok("show"))]).unwrap();
        let root = controller("/user").routes([("item", inner)]).unwrap();
        let d = dispatcher(root);

        let names: Vec<_> = d.routes().map(|(n, _, p)| (n.to_string(), p.to_string())).collect();
        assert_eq!(names, vec![("item.show".to_string(), "/user/:id".to_string())]);

        let reply = d.dispatch(Request::new(Method::GET, "/user/7")).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, json!("show"));
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let root = Controller::builder()
            .routes([
                ("literal", at("/a/me", "me")),
                ("param", at("/a/:id", "param")),
            ])
            .unwrap();
        let d = dispatcher(root);

        assert_eq!(d.dispatch(Request::new(Method::GET, "/a/me")).await.body, json!("me"));
        assert_eq!(d.dispatch(Request::new(Method::GET, "/a/you")).await.body, json!("param"));
    }

    #[tokio::test]
    async fn test_not_found_envelope() {
        let d = dispatcher(controller("/x").routes([("r", ok("x"))]).unwrap());
        let reply = d.dispatch(Request::new(Method::GET, "/nope")).await;

        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body["error"]["code"], "NOT_FOUND");
        let id = reply.headers.get(REQUEST_ID_HEADER).unwrap().to_str().unwrap();
        assert_eq!(reply.body["requestId"], id);
    }

    #[tokio::test]
    async fn test_method_not_allowed_lists_methods() {
        let root = controller("/x")
            .routes([
                ("read", ok("x")),
                (
                    "write",
                    post("/")
                        .handler(|a: HandlerArgs| async move { HandlerResult::Ok(a.input) })
                        .unwrap(),
                ),
            ])
            .unwrap();
        let reply = dispatcher(root).dispatch(Request::new(Method::DELETE, "/x")).await;

        assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(reply.headers.get(ALLOW).unwrap(), "GET, POST");
        assert_eq!(reply.body["error"]["code"], "METHOD_NOT_ALLOWED");
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let d = dispatcher(controller("/x").routes([("r", ok("x"))]).unwrap());
        let id = RequestId::new().to_string();
        let reply = d
            .dispatch(Request::new(Method::GET, "/x").with_header(REQUEST_ID_HEADER, &id))
            .await;
        assert_eq!(reply.headers.get(REQUEST_ID_HEADER).unwrap(), id.as_str());

        let reply = d
            .dispatch(Request::new(Method::GET, "/x").with_header(REQUEST_ID_HEADER, "garbage"))
            .await;
        assert_ne!(reply.headers.get(REQUEST_ID_HEADER).unwrap(), "garbage");
    }

    #[tokio::test]
    async fn test_context_factory_runs_before_chain() {
        let route = get("/")
            .middleware(FnMiddleware::new("role", |inv, next| {
                Box::pin(next.run_with(inv, ContextPatch::new().set("role", json!("admin"))))
            }))
            .handler(|args: HandlerArgs| async move { HandlerResult::Ok(args.ctx.to_json()) })
            .unwrap();
        let d = Dispatcher::builder()
            .context_factory(|req: &Request| {
                let tenant = req.header("x-tenant").unwrap_or("none").to_string();
                async move { Ok(Context::from_json(json!({ "tenant": tenant }))) }
            })
            .build(controller("/me").routes([("me", route)]).unwrap())
            .unwrap();

        let reply = d
            .dispatch(Request::new(Method::GET, "/me").with_header("x-tenant", "acme"))
            .await;
        assert_eq!(reply.body, json!({"tenant": "acme", "role": "admin"}));
    }

    #[tokio::test]
    async fn test_factory_error_is_answered() {
        let d = Dispatcher::builder()
            .context_factory(|_req: &Request| async {
                Err(ApexError::unauthorized("no session").into())
            })
            .build(controller("/x").routes([("r", ok("x"))]).unwrap())
            .unwrap();

        let reply = d.dispatch(Request::new(Method::GET, "/x")).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body["error"]["message"], "no session");
    }

    #[tokio::test]
    async fn test_unexpected_error_is_hidden() {
        let route = get("/")
            .handler(|_a: HandlerArgs| async {
                Err::<Value, HandlerError>(anyhow::anyhow!("db password is hunter2").into())
            })
            .unwrap();
        let root = controller("/boom").routes([("r", route)]).unwrap();

        let hidden = dispatcher(root.clone()).dispatch(Request::new(Method::GET, "/boom")).await;
        assert_eq!(hidden.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!hidden.body.to_string().contains("hunter2"));

        let exposed = Dispatcher::builder()
            .expose_internal_errors(true)
            .build(root)
            .unwrap()
            .dispatch(Request::new(Method::GET, "/boom"))
            .await;
        assert!(exposed.body.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_query_coercion() {
        let route = get("/?page=int&tags=[string]")
            .handler(|args: HandlerArgs| async move { HandlerResult::Ok(Value::Object(args.query)) })
            .unwrap();
        let d = dispatcher(controller("/items").routes([("list", route)]).unwrap());

        let reply = d
            .dispatch(
                Request::new(Method::GET, "/items")
                    .with_query("page", "2")
                    .with_query("tags", "a")
                    .with_query("tags", "b"),
            )
            .await;
        assert_eq!(reply.body, json!({"page": 2, "tags": ["a", "b"]}));

        let reply = d.dispatch(Request::new(Method::GET, "/items?page=x")).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["error"]["code"], ErrorCode::BadRequest.as_str());
    }

    #[tokio::test]
    async fn test_date_query_is_normalized_or_rejected() {
        let route = get("/?since=date")
            .handler(|args: HandlerArgs| async move { HandlerResult::Ok(Value::Object(args.query)) })
            .unwrap();
        let d = dispatcher(controller("/events").routes([("list", route)]).unwrap());

        let reply = d.dispatch(Request::new(Method::GET, "/events?since=2024-03-01")).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, json!({"since": "2024-03-01T00:00:00Z"}));

        let reply = d.dispatch(Request::new(Method::GET, "/events?since=not-a-date")).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["error"]["code"], ErrorCode::BadRequest.as_str());
    }

    #[tokio::test]
    async fn test_declared_schemes_reach_middleware() {
        let guard = FnMiddleware::new("api-key", |inv, next| {
            Box::pin(async move {
                let Some(key) = inv.credential("key") else {
                    return Err(ApexError::unauthorized("missing api key").into());
                };
                let patch = ContextPatch::new().set("key", json!(key));
                next.run_with(inv, patch).await
            })
        });
        let route = get("/")
            .middleware(guard)
            .handler(|args: HandlerArgs| async move { HandlerResult::Ok(args.ctx.to_json()) })
            .unwrap();
        let d = Dispatcher::builder()
            .security_scheme("key", SecurityScheme::api_key("x-api-key", apex_core::ApiKeyLocation::Header))
            .build(controller("/me").routes([("me", route)]).unwrap())
            .unwrap();

        assert!(d.security_schemes().contains("key"));

        let reply = d.dispatch(Request::new(Method::GET, "/me")).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

        let reply = d
            .dispatch(Request::new(Method::GET, "/me").with_header("x-api-key", "k-1"))
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["key"], json!("k-1"));
    }

    #[tokio::test]
    async fn test_output_validation_can_be_disabled() {
        let route = get("/")
            .output(apex_core::Schema::integer())
            .handler(|_a: HandlerArgs| async { HandlerResult::Ok(json!("not a number")) })
            .unwrap();
        let root = controller("/n").routes([("n", route)]).unwrap();

        let strict = dispatcher(root.clone()).dispatch(Request::new(Method::GET, "/n")).await;
        assert_eq!(strict.status, StatusCode::INTERNAL_SERVER_ERROR);

        let lax = Dispatcher::builder()
            .validate_output(false)
            .build(root)
            .unwrap()
            .dispatch(Request::new(Method::GET, "/n"))
            .await;
        assert_eq!(lax.status, StatusCode::OK);
    }

    #[test]
    fn test_duplicate_param_across_levels() {
        let inner = controller("/:id").routes([("show", ok("show"))]).unwrap();
        let root = controller("/:id").routes([("item", inner)]).unwrap();
        let err = Dispatcher::builder().build(root).unwrap_err();
        assert!(matches!(err, BuildError::Path(_)));
    }
}
