//! Construction-time errors.

use apex_core::SchemaError;
use apex_router::PathError;
use thiserror::Error;

/// A route or controller definition is invalid.
///
/// Raised by the terminal builder calls ([`RouteBuilder::handler`],
/// [`ControllerBuilder::routes`]) and by [`DispatcherBuilder::build`], so a
/// broken route table fails at startup, never while serving.
///
/// [`RouteBuilder::handler`]: crate::RouteBuilder::handler
/// [`ControllerBuilder::routes`]: crate::ControllerBuilder::routes
/// [`DispatcherBuilder::build`]: crate::DispatcherBuilder::build
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// The path is malformed or declares a name twice.
    #[error(transparent)]
    Path(#[from] PathError),

    /// A schema failed to compile.
    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),

    /// `input` was called twice on one route.
    #[error("input schema already set for {route}")]
    InputAlreadySet {
        /// Method and path of the route.
        route: String,
    },

    /// `output` was called twice on one route.
    #[error("output schema already set for {route}")]
    OutputAlreadySet {
        /// Method and path of the route.
        route: String,
    },

    /// `params` was called twice on one route.
    #[error("params schema already set for {route}")]
    ParamsAlreadySet {
        /// Method and path of the route.
        route: String,
    },

    /// A route referenced a model that is not registered.
    #[error("unknown model '{model}' for {route}")]
    UnknownModel {
        /// Method and path of the route.
        route: String,
        /// The missing model name.
        model: String,
    },

    /// Two entries of one route map share a key.
    #[error("duplicate route key '{key}' in controller '{controller}'")]
    DuplicateRouteKey {
        /// The repeated key.
        key: String,
        /// Path of the controller.
        controller: String,
    },
}
