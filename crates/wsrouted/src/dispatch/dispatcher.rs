//! Routes a decoded request to its endpoint and produces the response.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use wsroute_config::Config;

use crate::endpoint::{
    CallContext, Component, ComponentDescriptor, EndpointDescriptor, EndpointRegistry, Injected,
};
use crate::services::{ConstructorArgs, ServiceProvider, ServiceScope};
use crate::session::{ConnectionContext, SessionHandle};

use super::{DISPATCH_TARGET, DispatchError, Request, Response, binder, timestamp_micros};

/// Dispatch behaviour taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Puts remote address, target and error detail into failure messages.
    pub development: bool,
    /// Slot that receives the connection context.
    pub context_slot: String,
    /// Slot that receives the session handle.
    pub transport_slot: String,
}

impl DispatchSettings {
    /// Reads the dispatch knobs from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            development: config.development(),
            context_slot: config.context_slot().to_owned(),
            transport_slot: config.transport_slot().to_owned(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Turns requests into responses. Shared by every session.
///
/// `distribute` never fails: unknown routes produce status `2`, and every
/// error or panic raised while constructing the component, binding arguments
/// or running the method produces status `1`.
pub struct Dispatcher {
    registry: Arc<EndpointRegistry>,
    services: Option<Arc<dyn ServiceProvider>>,
    settings: DispatchSettings,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<EndpointRegistry>,
        services: Option<Arc<dyn ServiceProvider>>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            services,
            settings,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Serves one request on behalf of `session`.
    #[must_use]
    pub fn distribute(
        &self,
        connection: &ConnectionContext,
        session: &SessionHandle,
        request: &Request,
    ) -> Response {
        let request_time = timestamp_micros();
        let route = request.target.trim().to_lowercase();
        let Some(endpoint) = self.registry.lookup(&route) else {
            debug!(
                target: DISPATCH_TARGET,
                connection = %connection.id(),
                remote = %connection.peer(),
                route = %route,
                "target not found"
            );
            return Response::not_found(
                request,
                self.not_found_message(connection, &route),
                request_time,
            );
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.invoke(endpoint, connection, session, request, &route)
        }))
        .unwrap_or_else(|payload| Err(DispatchError::panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(body) => Response::success(request, body, request_time),
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    connection = %connection.id(),
                    remote = %connection.peer(),
                    route = %route,
                    error = %error,
                    "endpoint invocation failed"
                );
                Response::failure(
                    request.id.clone(),
                    Some(request.target.clone()),
                    self.failure_message(connection, &route, &error),
                    request_time,
                )
            }
        }
    }

    fn invoke(
        &self,
        endpoint: &EndpointDescriptor,
        connection: &ConnectionContext,
        session: &SessionHandle,
        request: &Request,
        route: &str,
    ) -> Result<Value, DispatchError> {
        let component = endpoint.component();
        let mut scope = self.services.as_ref().map(|services| services.open_scope());
        let args = self.constructor_args(component, scope.as_mut(), connection, route);
        let mut instance = component
            .build(&args)
            .map_err(|source| DispatchError::construction(component.name(), source))?;
        self.inject(instance.as_mut(), connection, session);

        let arguments = binder::bind(endpoint.params(), request.body.as_ref(), connection, route);
        let call = CallContext::new(connection, session, route);
        let reply = endpoint
            .invoke(instance.as_mut(), &call, &arguments)
            .map_err(DispatchError::invocation)?;
        let body = reply.resolve().map_err(DispatchError::invocation)?;
        drop(instance);
        drop(scope);
        Ok(body)
    }

    fn constructor_args(
        &self,
        component: &ComponentDescriptor,
        scope: Option<&mut ServiceScope>,
        connection: &ConnectionContext,
        route: &str,
    ) -> ConstructorArgs {
        let declared = component.constructor();
        if declared.is_empty() {
            return ConstructorArgs::default();
        }
        let (Some(services), Some(scope)) = (self.services.as_ref(), scope) else {
            warn!(
                target: DISPATCH_TARGET,
                connection = %connection.id(),
                route,
                component = component.name(),
                "no service provider configured; constructor services resolve to none"
            );
            return ConstructorArgs::new(
                declared.iter().map(|param| (param.clone(), None)).collect(),
            );
        };
        ConstructorArgs::new(
            declared
                .iter()
                .map(|param| (param.clone(), services.resolve(param, scope)))
                .collect(),
        )
    }

    fn inject(
        &self,
        instance: &mut dyn Component,
        connection: &ConnectionContext,
        session: &SessionHandle,
    ) {
        instance.inject(&self.settings.context_slot, Injected::Context(connection));
        instance.inject(&self.settings.transport_slot, Injected::Transport(session));
    }

    fn not_found_message(&self, connection: &ConnectionContext, route: &str) -> String {
        if self.settings.development {
            format!("{} -> Target:{route} not found", connection.peer())
        } else {
            String::from("target not found")
        }
    }

    fn failure_message(
        &self,
        connection: &ConnectionContext,
        route: &str,
        error: &DispatchError,
    ) -> Option<String> {
        self.settings
            .development
            .then(|| format!("{} -> Target:{route}\n{error}", connection.peer()))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Dispatcher")
            .field("routes", &self.registry.len())
            .field("services", &self.services.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("unknown panic"))
}
