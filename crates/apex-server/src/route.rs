//! Route builder.
//!
//! A route is built from a method constructor and a chain of pure builder
//! calls, each returning a new [`RouteBuilder`]. The terminal
//! [`RouteBuilder::handler`] freezes the definition into a [`Route`].
//!
//! # Example
//!
//! ```
//! use apex_core::{HandlerResult, Schema};
//! use apex_server::{post, HandlerArgs};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct NewUser {
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct Created {
//!     id: u64,
//!     name: String,
//! }
//!
//! let create = post("/")
//!     .input(Schema::object([("name", Schema::string().min_length(1))]))
//!     .status(http::StatusCode::CREATED)
//!     .handler(|args: HandlerArgs<NewUser>| async move {
//!         HandlerResult::Ok(Created { id: 1, name: args.input.name })
//!     })
//!     .unwrap();
//!
//! assert_eq!(create.to_string(), "POST /");
//! ```
//!
//! Misuse such as declaring the input schema twice is recorded on the
//! builder and reported by `handler`, so chains stay fluent and still fail
//! before any request is served.

use crate::error::BuildError;
use apex_core::{
    ApexError, Context, HandlerResult, IntoValidator, Invocation, Meta, Models, Params, Reply,
    RequestId, Signal, Validator,
};
use apex_middleware::{BoxFuture, Chain, Endpoint, Middleware, Next};
use apex_router::Path;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Type-erased route handler.
type ErasedHandler = Arc<dyn Fn(HandlerArgs) -> BoxFuture<'static, HandlerResult<Value>> + Send + Sync>;

/// What a handler receives.
///
/// `input` has already passed the route's input schema and been decoded
/// into `I`.
#[derive(Debug, Clone)]
pub struct HandlerArgs<I = Value> {
    /// Request identifier.
    pub request_id: RequestId,
    /// Context accumulated by the factory and the middleware chain.
    pub ctx: Context,
    /// Validated input.
    pub input: I,
    /// Path parameters.
    pub params: Params,
    /// Coerced query values.
    pub query: Map<String, Value>,
    /// Route metadata.
    pub meta: Meta,
    /// Cancellation signal.
    pub signal: Signal,
}

impl<I> HandlerArgs<I> {
    /// Returns a path parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }
}

impl HandlerArgs {
    fn decode<I: DeserializeOwned>(self) -> HandlerResult<HandlerArgs<I>> {
        let input = serde_json::from_value(self.input).map_err(|err| {
            ApexError::unprocessable(format!("request body has the wrong shape: {err}"))
        })?;
        Ok(HandlerArgs {
            request_id: self.request_id,
            ctx: self.ctx,
            input,
            params: self.params,
            query: self.query,
            meta: self.meta,
            signal: self.signal,
        })
    }
}

/// Begins a `GET` route.
pub fn get(path: &str) -> RouteBuilder {
    route(Method::GET, path)
}

/// Begins a `POST` route.
pub fn post(path: &str) -> RouteBuilder {
    route(Method::POST, path)
}

/// Begins a `PUT` route.
pub fn put(path: &str) -> RouteBuilder {
    route(Method::PUT, path)
}

/// Begins a `PATCH` route.
pub fn patch(path: &str) -> RouteBuilder {
    route(Method::PATCH, path)
}

/// Begins a `DELETE` route.
pub fn delete(path: &str) -> RouteBuilder {
    route(Method::DELETE, path)
}

/// Begins a route matching any method.
pub fn all(path: &str) -> RouteBuilder {
    RouteBuilder::new(None, path)
}

/// Begins a route for `method`.
pub fn route(method: Method, path: &str) -> RouteBuilder {
    RouteBuilder::new(Some(method), path)
}

/// Persistent builder for a single route.
///
/// Every method consumes the builder and returns a new one; clone it to
/// branch several routes off a common prefix.
#[derive(Clone)]
pub struct RouteBuilder {
    method: Option<Method>,
    path: Path,
    label: String,
    input: Option<Validator>,
    output: Option<Validator>,
    params: Option<Validator>,
    chain: Chain,
    meta: Meta,
    status: StatusCode,
    pending: Option<BuildError>,
}

impl RouteBuilder {
    fn new(method: Option<Method>, path: &str) -> Self {
        let label = format!("{} {path}", method_label(method.as_ref()));
        let (path, pending) = match Path::parse(path) {
            Ok(path) => (path, None),
            Err(err) => (Path::root(), Some(err.into())),
        };
        Self {
            method,
            path,
            label,
            input: None,
            output: None,
            params: None,
            chain: Chain::empty(),
            meta: Meta::default(),
            status: StatusCode::OK,
            pending,
        }
    }

    /// Declares the input schema. May be called once.
    #[must_use]
    pub fn input(mut self, schema: impl IntoValidator) -> Self {
        let result = set_once(&mut self.input, schema, || BuildError::InputAlreadySet {
            route: self.label.clone(),
        });
        self.record(result);
        self
    }

    /// Declares the output schema. May be called once.
    #[must_use]
    pub fn output(mut self, schema: impl IntoValidator) -> Self {
        let result = set_once(&mut self.output, schema, || BuildError::OutputAlreadySet {
            route: self.label.clone(),
        });
        self.record(result);
        self
    }

    /// Declares the input schema by naming a registered model. Counts as
    /// the one [`input`](Self::input) call.
    #[must_use]
    pub fn input_model(mut self, models: &Models, name: &str) -> Self {
        match models.get(name) {
            Some(validator) => self.input(validator),
            None => {
                let err = self.unknown_model(name);
                self.record(Err(err));
                self
            }
        }
    }

    /// Declares the output schema by naming a registered model. Counts as
    /// the one [`output`](Self::output) call.
    #[must_use]
    pub fn output_model(mut self, models: &Models, name: &str) -> Self {
        match models.get(name) {
            Some(validator) => self.output(validator),
            None => {
                let err = self.unknown_model(name);
                self.record(Err(err));
                self
            }
        }
    }

    /// Declares a schema for the path parameters, checked before the input.
    /// May be called once.
    #[must_use]
    pub fn params(mut self, schema: impl IntoValidator) -> Self {
        let result = set_once(&mut self.params, schema, || BuildError::ParamsAlreadySet {
            route: self.label.clone(),
        });
        self.record(result);
        self
    }

    /// Appends a middleware unit to the route's own chain.
    #[must_use]
    pub fn middleware(mut self, unit: impl Middleware) -> Self {
        self.chain = self.chain.append(unit);
        self
    }

    /// Appends every unit of `chain`.
    #[must_use]
    pub fn chain(mut self, chain: &Chain) -> Self {
        self.chain = self.chain.concat(chain);
        self
    }

    /// Sets route metadata. The last call wins.
    #[must_use]
    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Meta::new(meta);
        self
    }

    /// Sets the status of successful replies (default `200 OK`).
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Attaches the handler and freezes the route.
    ///
    /// The handler's input type `I` is decoded from the validated input;
    /// a value that passes the schema but does not decode is a 422. The
    /// output is serialized and, when the route has an output schema,
    /// validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns the first construction error recorded by an earlier call.
    pub fn handler<I, O, F, Fut>(self, handler: F) -> Result<Route, BuildError>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(HandlerArgs<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<O>> + Send + 'static,
    {
        if let Some(err) = self.pending {
            return Err(err);
        }

        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |args: HandlerArgs| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let args = args.decode::<I>()?;
                let output = handler(args).await?;
                Ok(serde_json::to_value(output)?)
            })
        });

        Ok(Route {
            inner: Arc::new(RouteInner {
                method: self.method,
                path: self.path,
                label: self.label,
                input: self.input,
                output: self.output,
                params: self.params,
                chain: self.chain,
                meta: self.meta,
                status: self.status,
                handler: erased,
            }),
        })
    }

    fn unknown_model(&self, name: &str) -> BuildError {
        BuildError::UnknownModel {
            route: self.label.clone(),
            model: name.to_string(),
        }
    }

    fn record(&mut self, result: Result<(), BuildError>) {
        if let Err(err) = result {
            self.pending.get_or_insert(err);
        }
    }
}

impl fmt::Debug for RouteBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteBuilder")
            .field("route", &self.label)
            .field("chain", &self.chain)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

fn set_once(
    slot: &mut Option<Validator>,
    schema: impl IntoValidator,
    already: impl FnOnce() -> BuildError,
) -> Result<(), BuildError> {
    if slot.is_some() {
        return Err(already());
    }
    *slot = Some(schema.into_validator()?);
    Ok(())
}

fn method_label(method: Option<&Method>) -> &str {
    method.map_or("*", Method::as_str)
}

/// A frozen route definition.
///
/// Cheap to clone; all clones share one definition.
#[derive(Clone)]
pub struct Route {
    inner: Arc<RouteInner>,
}

struct RouteInner {
    method: Option<Method>,
    path: Path,
    label: String,
    input: Option<Validator>,
    output: Option<Validator>,
    params: Option<Validator>,
    chain: Chain,
    meta: Meta,
    status: StatusCode,
    handler: ErasedHandler,
}

impl Route {
    /// The method this route answers, or `None` for any method.
    pub fn method(&self) -> Option<&Method> {
        self.inner.method.as_ref()
    }

    /// True if the route answers `method`.
    pub fn accepts(&self, method: &Method) -> bool {
        self.inner.method.as_ref().map_or(true, |m| m == method)
    }

    /// The route's own path, relative to its controller.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Route metadata.
    pub fn meta(&self) -> &Meta {
        &self.inner.meta
    }

    /// The route's own middleware chain.
    pub fn chain(&self) -> &Chain {
        &self.inner.chain
    }

    /// Status of successful replies.
    pub fn status(&self) -> StatusCode {
        self.inner.status
    }

    /// True if an input schema was declared.
    pub fn has_input(&self) -> bool {
        self.inner.input.is_some()
    }

    /// True if an output schema was declared.
    pub fn has_output(&self) -> bool {
        self.inner.output.is_some()
    }

    /// Calls the route directly with a context and raw input, running its
    /// own chain, validators and handler. Returns the reply body.
    ///
    /// # Errors
    ///
    /// Returns whatever the chain, the validators or the handler raised.
    pub async fn call(&self, ctx: Context, input: Value) -> HandlerResult<Value> {
        self.invoke(Invocation::new(ctx, input))
            .await
            .map(|reply| reply.body)
    }

    /// Runs a prepared invocation through the route's own chain and
    /// endpoint. Output validation is always on.
    ///
    /// # Errors
    ///
    /// Returns whatever the chain, the validators or the handler raised.
    pub async fn invoke(&self, mut inv: Invocation) -> HandlerResult<Reply> {
        inv.meta = self.inner.meta.clone();
        let endpoint = self.endpoint(true);
        Next::start(&self.inner.chain, &endpoint).run(inv).await
    }

    pub(crate) fn endpoint(&self, validate_output: bool) -> RouteEndpoint<'_> {
        RouteEndpoint {
            route: &self.inner,
            validate_output,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", method_label(self.method()), self.inner.path)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("route", &self.to_string())
            .field("chain", &self.inner.chain)
            .field("status", &self.inner.status)
            .finish_non_exhaustive()
    }
}

/// The innermost step of a route's chain: validation and the handler.
pub(crate) struct RouteEndpoint<'a> {
    route: &'a RouteInner,
    validate_output: bool,
}

impl Endpoint for RouteEndpoint<'_> {
    fn call(&self, inv: Invocation) -> BoxFuture<'_, HandlerResult<Reply>> {
        Box::pin(self.route.run(inv, self.validate_output))
    }
}

impl RouteInner {
    async fn run(&self, inv: Invocation, validate_output: bool) -> HandlerResult<Reply> {
        if let Some(validator) = &self.params {
            validator
                .validate(inv.params.to_json())
                .map_err(|errors| errors.into_apex("invalid path parameters"))?;
        }

        let input = match &self.input {
            Some(validator) => validator
                .validate(inv.input)
                .map_err(|errors| errors.into_apex("invalid request body"))?,
            None => inv.input,
        };

        let request_id = inv.request_id;
        let output = (self.handler)(HandlerArgs {
            request_id,
            ctx: inv.ctx,
            input,
            params: inv.params,
            query: inv.query,
            meta: inv.meta,
            signal: inv.signal,
        })
        .await?;

        let output = match &self.output {
            Some(validator) if validate_output => match validator.validate(output) {
                Ok(output) => output,
                Err(errors) => {
                    tracing::error!(
                        request_id = %request_id,
                        route = %self.label,
                        errors = ?errors,
                        "handler output violates its schema"
                    );
                    return Err(ApexError::internal("response failed validation").into());
                }
            },
            _ => output,
        };

        Ok(Reply::json(output).with_status(self.status))
    }
}
