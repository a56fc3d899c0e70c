//! Component contract and per-invocation call context.

use std::any::{Any, type_name};
use std::fmt;

use crate::services::{ConstructorArgs, ServiceParam};
use crate::session::{ConnectionContext, SessionHandle};

use super::EndpointError;

/// Value offered to a component through a named injection slot.
#[derive(Debug, Clone, Copy)]
pub enum Injected<'a> {
    /// Connection-level context (identity, remote address, request path).
    Context(&'a ConnectionContext),
    /// Handle on the live session, able to request a close.
    Transport(&'a SessionHandle),
}

/// A type hosting endpoint methods.
///
/// A fresh instance is built for every invocation, so components may keep
/// per-call state in `self` without synchronisation.
pub trait Component: Any + Send + 'static {
    /// Receives connection state for a configured slot name.
    ///
    /// Returns whether the slot was taken. Components that only need the
    /// call context passed to each method can ignore this.
    fn inject(&mut self, _slot: &str, _value: Injected<'_>) -> bool {
        false
    }
}

type Factory<C> = Box<dyn Fn(&ConstructorArgs) -> Result<C, EndpointError> + Send + Sync>;

/// How to construct component `C`.
pub struct ComponentSpec<C> {
    constructor: Vec<ServiceParam>,
    factory: Factory<C>,
}

impl<C: Component> ComponentSpec<C> {
    /// Builds instances with `factory`.
    #[must_use]
    pub fn new(
        factory: impl Fn(&ConstructorArgs) -> Result<C, EndpointError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            constructor: Vec::new(),
            factory: Box::new(factory),
        }
    }

    /// Declares a constructor dependency.
    #[must_use]
    pub fn with_service(mut self, param: ServiceParam) -> Self {
        self.constructor.push(param);
        self
    }

    pub(crate) fn into_parts(self) -> (Vec<ServiceParam>, Factory<C>) {
        (self.constructor, self.factory)
    }
}

impl<C: Component + Default> ComponentSpec<C> {
    /// Builds instances with [`Default`] and no dependencies.
    #[must_use]
    pub fn default_constructed() -> Self {
        Self::new(|_| Ok(C::default()))
    }
}

impl<C> fmt::Debug for ComponentSpec<C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ComponentSpec")
            .field("component", &type_name::<C>())
            .field("constructor", &self.constructor)
            .finish_non_exhaustive()
    }
}

/// Everything an endpoint method may consult about the current call.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    connection: &'a ConnectionContext,
    session: &'a SessionHandle,
    route: &'a str,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(
        connection: &'a ConnectionContext,
        session: &'a SessionHandle,
        route: &'a str,
    ) -> Self {
        Self {
            connection,
            session,
            route,
        }
    }

    #[must_use]
    pub fn connection(&self) -> &'a ConnectionContext {
        self.connection
    }

    #[must_use]
    pub fn session(&self) -> &'a SessionHandle {
        self.session
    }

    /// Lowercased route being served.
    #[must_use]
    pub fn route(&self) -> &'a str {
        self.route
    }
}
