//! Controller builder.
//!
//! A controller groups routes and nested controllers under a base path and
//! a shared middleware chain. Nested paths are relative to the parent;
//! paths and chains are only combined when a [`Dispatcher`] is built, by
//! walking the tree from the root.
//!
//! # Example
//!
//! ```
//! use apex_core::HandlerResult;
//! use apex_server::{controller, get, Controller, HandlerArgs, RouteNode};
//! use serde_json::json;
//!
//! let users = controller("/user")
//!     .routes([(
//!         "get",
//!         get("/:id")
//!             .handler(|args: HandlerArgs| async move {
//!                 HandlerResult::Ok(json!({ "id": args.param("id") }))
//!             })
//!             .unwrap(),
//!     )])
//!     .unwrap();
//!
//! let root = Controller::builder()
//!     .routes([("users", RouteNode::from(users))])
//!     .unwrap();
//!
//! assert_eq!(root.len(), 1);
//! ```
//!
//! [`Dispatcher`]: crate::Dispatcher

use crate::error::BuildError;
use crate::route::Route;
use apex_middleware::{Chain, Middleware};
use apex_router::Path;
use indexmap::IndexMap;

/// Begins a controller rooted at `path`.
pub fn controller(path: &str) -> ControllerBuilder {
    match Path::parse(path) {
        Ok(path) => ControllerBuilder::new(path, None),
        Err(err) => ControllerBuilder::new(Path::root(), Some(err.into())),
    }
}

/// A child of a controller.
#[derive(Debug, Clone)]
pub enum RouteNode {
    /// A route.
    Route(Route),
    /// A nested controller.
    Controller(Controller),
}

impl From<Route> for RouteNode {
    fn from(route: Route) -> Self {
        Self::Route(route)
    }
}

impl From<Controller> for RouteNode {
    fn from(controller: Controller) -> Self {
        Self::Controller(controller)
    }
}

/// Persistent builder for a controller.
#[derive(Debug, Clone)]
pub struct ControllerBuilder {
    path: Path,
    chain: Chain,
    pending: Option<BuildError>,
}

impl ControllerBuilder {
    fn new(path: Path, pending: Option<BuildError>) -> Self {
        Self {
            path,
            chain: Chain::empty(),
            pending,
        }
    }

    /// Appends a unit to the controller chain. It runs before the chains of
    /// every route and nested controller below.
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

    /// Attaches the children and freezes the controller.
    ///
    /// Children keep their insertion order, which is also the order in
    /// which routes are tried.
    ///
    /// # Errors
    ///
    /// Returns an error recorded earlier (an invalid path) or
    /// [`BuildError::DuplicateRouteKey`] when two children share a key.
    pub fn routes<I, K, N>(self, routes: I) -> Result<Controller, BuildError>
    where
        I: IntoIterator<Item = (K, N)>,
        K: Into<String>,
        N: Into<RouteNode>,
    {
        if let Some(err) = self.pending {
            return Err(err);
        }

        let mut children = IndexMap::new();
        for (key, node) in routes {
            let key = key.into();
            if children.contains_key(&key) {
                return Err(BuildError::DuplicateRouteKey {
                    key,
                    controller: self.path.to_string(),
                });
            }
            children.insert(key, node.into());
        }

        Ok(Controller {
            path: self.path,
            chain: self.chain,
            children,
        })
    }
}

/// A frozen controller: a base path, a chain and an ordered set of
/// children.
#[derive(Debug, Clone)]
pub struct Controller {
    path: Path,
    chain: Chain,
    children: IndexMap<String, RouteNode>,
}

impl Controller {
    /// Begins a controller at `/`, for trees whose children carry the full
    /// paths.
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new(Path::root(), None)
    }

    /// The controller's own path, relative to its parent.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The controller's own chain.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Children in insertion order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &RouteNode)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Looks up a child by key.
    pub fn get(&self, key: &str) -> Option<&RouteNode> {
        self.children.get(key)
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// True if the controller has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
