//! Errors raised by endpoint code and by registry construction.

use thiserror::Error;

use super::ParamKind;

/// Failure reported by a component factory or an endpoint method.
///
/// Every variant becomes a status `1` response; the message is only shown
/// to callers in development mode.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// A required argument bound `null`.
    #[error("missing argument '{name}'")]
    MissingArgument { name: String },
    /// An argument could not be deserialised into the requested type.
    #[error("invalid argument '{name}': {message}")]
    InvalidArgument { name: String, message: String },
    /// A constructor service did not resolve.
    #[error("service '{name}' is not available")]
    MissingService { name: String },
    /// The worker behind a deferred result went away without answering.
    #[error("deferred result was abandoned before completion")]
    Abandoned,
    #[error("failed to serialise result: {0}")]
    Serialise(#[from] serde_json::Error),
    /// Application-level failure reported by the endpoint.
    #[error("{message}")]
    Failed { message: String },
}

impl EndpointError {
    #[must_use]
    pub fn missing_argument(name: impl Into<String>) -> Self {
        Self::MissingArgument { name: name.into() }
    }

    #[must_use]
    pub fn invalid_argument(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn missing_service(name: impl Into<String>) -> Self {
        Self::MissingService { name: name.into() }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// A parameter value that cannot be converted to its declared kind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("expected {expected}, found {found}")]
    Mismatch {
        expected: ParamKind,
        found: &'static str,
    },
    #[error("'{literal}' is not a valid {expected}")]
    Literal { expected: ParamKind, literal: String },
}

/// Errors detected while building an [`EndpointRegistry`](super::EndpointRegistry).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("endpoint route must not be empty")]
    EmptyRoute,
    #[error("route '{route}' is already registered")]
    DuplicateRoute { route: String },
    #[error("component {component} is already registered")]
    DuplicateComponent { component: &'static str },
    #[error("route '{route}' refers to unregistered component {component}")]
    UnknownComponent {
        route: String,
        component: &'static str,
    },
}
