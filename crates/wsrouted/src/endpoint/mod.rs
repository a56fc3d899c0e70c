//! Endpoint registration: components, routes, parameters and replies.
//!
//! An endpoint is a method on a [`Component`] reachable under a
//! case-insensitive route. The [`EndpointRegistry`] is built once at startup
//! and shared read-only by every session.

mod component;
mod errors;
mod params;
mod registry;
mod reply;

pub use self::component::{CallContext, Component, ComponentSpec, Injected};
pub use self::errors::{ConversionError, EndpointError, RegistryError};
pub use self::params::{Arguments, ParamKind, ParamSpec};
pub use self::registry::{ComponentDescriptor, EndpointDescriptor, EndpointRegistry, RegistryBuilder};
pub use self::reply::{Completer, Deferred, Reply};

const ENDPOINT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::endpoint");
