//! Route table from lowercased target names to endpoint descriptors.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use crate::services::{ConstructorArgs, ServiceParam};

use super::{
    Arguments, CallContext, Component, ComponentSpec, EndpointError, ParamSpec, RegistryError,
    Reply,
};

type Build = dyn Fn(&ConstructorArgs) -> Result<Box<dyn Component>, EndpointError> + Send + Sync;
type Invoke =
    dyn Fn(&mut dyn Component, &CallContext<'_>, &Arguments) -> Result<Reply, EndpointError>
        + Send
        + Sync;

/// A registered component type.
pub struct ComponentDescriptor {
    name: &'static str,
    constructor: Vec<ServiceParam>,
    build: Box<Build>,
}

impl ComponentDescriptor {
    /// Type name of the component, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared constructor dependencies, in order.
    #[must_use]
    pub fn constructor(&self) -> &[ServiceParam] {
        &self.constructor
    }

    pub(crate) fn build(&self, args: &ConstructorArgs) -> Result<Box<dyn Component>, EndpointError> {
        (self.build)(args)
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("constructor", &self.constructor)
            .finish_non_exhaustive()
    }
}

/// A routable endpoint: owning component, parameters and method.
pub struct EndpointDescriptor {
    route: String,
    component: Arc<ComponentDescriptor>,
    params: Arc<[ParamSpec]>,
    invoke: Box<Invoke>,
}

impl EndpointDescriptor {
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    #[must_use]
    pub fn component(&self) -> &ComponentDescriptor {
        &self.component
    }

    #[must_use]
    pub fn params(&self) -> &Arc<[ParamSpec]> {
        &self.params
    }

    pub(crate) fn invoke(
        &self,
        instance: &mut dyn Component,
        call: &CallContext<'_>,
        arguments: &Arguments,
    ) -> Result<Reply, EndpointError> {
        (self.invoke)(instance, call, arguments)
    }
}

impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EndpointDescriptor")
            .field("route", &self.route)
            .field("component", &self.component.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Immutable route table shared by every session.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, EndpointDescriptor>,
}

impl EndpointRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Finds the endpoint for `route`, ignoring ASCII case.
    #[must_use]
    pub fn lookup(&self, route: &str) -> Option<&EndpointDescriptor> {
        self.endpoints.get(route).or_else(|| {
            let lowered = route.to_lowercase();
            self.endpoints.get(&lowered)
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Registered routes in sorted order.
    #[must_use]
    pub fn routes(&self) -> Vec<&str> {
        let mut routes: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        routes.sort_unstable();
        routes
    }
}

/// Collects components and endpoints, validating as it goes.
#[derive(Default)]
pub struct RegistryBuilder {
    components: HashMap<TypeId, Arc<ComponentDescriptor>>,
    endpoints: HashMap<String, EndpointDescriptor>,
}

impl RegistryBuilder {
    /// Registers component type `C`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateComponent`] when `C` is already
    /// registered.
    pub fn component<C: Component>(mut self, spec: ComponentSpec<C>) -> Result<Self, RegistryError> {
        let Entry::Vacant(slot) = self.components.entry(TypeId::of::<C>()) else {
            return Err(RegistryError::DuplicateComponent {
                component: type_name::<C>(),
            });
        };
        let (constructor, factory) = spec.into_parts();
        slot.insert(Arc::new(ComponentDescriptor {
            name: type_name::<C>(),
            constructor,
            build: Box::new(move |args: &ConstructorArgs| {
                factory(args).map(|instance| Box::new(instance) as Box<dyn Component>)
            }),
        }));
        Ok(self)
    }

    /// Routes `route` (case-insensitively) to `method` on component `C`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] for empty or duplicate routes and for
    /// components that were not registered first.
    pub fn endpoint<C, F>(
        mut self,
        route: &str,
        params: Vec<ParamSpec>,
        method: F,
    ) -> Result<Self, RegistryError>
    where
        C: Component,
        F: Fn(&mut C, &CallContext<'_>, &Arguments) -> Result<Reply, EndpointError>
            + Send
            + Sync
            + 'static,
    {
        let route = route.trim().to_lowercase();
        if route.is_empty() {
            return Err(RegistryError::EmptyRoute);
        }
        let Some(component) = self.components.get(&TypeId::of::<C>()).map(Arc::clone) else {
            return Err(RegistryError::UnknownComponent {
                route,
                component: type_name::<C>(),
            });
        };
        let Entry::Vacant(slot) = self.endpoints.entry(route.clone()) else {
            return Err(RegistryError::DuplicateRoute { route });
        };
        slot.insert(EndpointDescriptor {
            route,
            component,
            params: Arc::from(params),
            invoke: Box::new(
                move |instance: &mut dyn Component,
                      call: &CallContext<'_>,
                      arguments: &Arguments| {
                    let instance: &mut dyn Any = instance;
                    let target = instance.downcast_mut::<C>().ok_or_else(|| {
                        EndpointError::failed(format!("instance is not a {}", type_name::<C>()))
                    })?;
                    method(target, call, arguments)
                },
            ),
        });
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> EndpointRegistry {
        EndpointRegistry {
            endpoints: self.endpoints,
        }
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RegistryBuilder")
            .field("components", &self.components.len())
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .finish()
    }
}
