//! Constructor dependencies for endpoint components.
//!
//! Components declare the services their constructor needs. Before each
//! invocation the dispatcher opens a [`ServiceScope`], resolves every
//! declared service through the configured [`ServiceProvider`] and releases
//! the scope once the response is ready. Without a provider every declared
//! service resolves to `None`.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;
use tracing::trace;

use crate::endpoint::EndpointError;

const SERVICES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::services");

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// Type-erased service instance.
pub type Service = Arc<dyn Any + Send + Sync>;

/// How long a resolved service lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// One instance for the whole process.
    Singleton,
    /// One instance per invocation scope.
    Scoped,
    /// A new instance on every resolution.
    Transient,
}

/// Identity of a service type.
///
/// Equality and hashing use the [`TypeId`]; the type name is carried for
/// diagnostics only.
#[derive(Clone, Copy)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    /// Key for service type `T`.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Type name of the service, for logs.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name)
    }
}

/// A constructor parameter: its name and the service key it asks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceParam {
    name: String,
    key: ServiceKey,
}

impl ServiceParam {
    /// Parameter `name` resolved by the service type `T`.
    #[must_use]
    pub fn of<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: ServiceKey::of::<T>(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn key(&self) -> ServiceKey {
        self.key
    }
}

/// Per-invocation cache of scoped services.
///
/// Dropping the scope releases every instance it holds.
pub struct ServiceScope {
    id: u64,
    instances: HashMap<ServiceKey, Service>,
}

impl ServiceScope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_SCOPE.fetch_add(1, Ordering::Relaxed),
            instances: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Returns the scoped instance for `key`, creating it on first use.
    pub fn get_or_insert_with(
        &mut self,
        key: ServiceKey,
        create: impl FnOnce() -> Service,
    ) -> Service {
        Arc::clone(self.instances.entry(key).or_insert_with(create))
    }
}

impl Default for ServiceScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceScope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ServiceScope")
            .field("id", &self.id)
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Drop for ServiceScope {
    fn drop(&mut self) {
        trace!(
            target: SERVICES_TARGET,
            scope = self.id,
            released = self.instances.len(),
            "service scope released"
        );
    }
}

/// Source of constructor dependencies.
pub trait ServiceProvider: Send + Sync {
    /// Opens a scope for one invocation.
    fn open_scope(&self) -> ServiceScope {
        ServiceScope::new()
    }

    /// Resolves `param`, caching scoped instances in `scope`.
    fn resolve(&self, param: &ServiceParam, scope: &mut ServiceScope) -> Option<Service>;
}

type Factory = Arc<dyn Fn() -> Service + Send + Sync>;

enum Registration {
    Instance(Service),
    Lazy(OnceCell<Service>, Factory),
    Scoped(Factory),
    Transient(Factory),
}

impl Registration {
    fn lifetime(&self) -> Lifetime {
        match self {
            Self::Instance(_) | Self::Lazy(..) => Lifetime::Singleton,
            Self::Scoped(_) => Lifetime::Scoped,
            Self::Transient(_) => Lifetime::Transient,
        }
    }
}

/// Type-keyed [`ServiceProvider`] with explicit lifetimes.
#[derive(Default)]
pub struct ServiceContainer {
    registrations: HashMap<ServiceKey, Registration>,
}

impl ServiceContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares `value` for the lifetime of the process.
    #[must_use]
    pub fn singleton<T: Any + Send + Sync>(self, value: T) -> Self {
        self.shared(Arc::new(value))
    }

    /// Shares an existing `Arc` for the lifetime of the process.
    #[must_use]
    pub fn shared<T: Any + Send + Sync>(mut self, value: Arc<T>) -> Self {
        self.registrations
            .insert(ServiceKey::of::<T>(), Registration::Instance(value));
        self
    }

    /// Builds the singleton on first use.
    #[must_use]
    pub fn lazy_singleton<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.registrations.insert(
            ServiceKey::of::<T>(),
            Registration::Lazy(OnceCell::new(), erase(factory)),
        );
        self
    }

    /// Builds one instance per invocation scope.
    #[must_use]
    pub fn scoped<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.registrations
            .insert(ServiceKey::of::<T>(), Registration::Scoped(erase(factory)));
        self
    }

    /// Builds a fresh instance on every resolution.
    #[must_use]
    pub fn transient<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.registrations
            .insert(ServiceKey::of::<T>(), Registration::Transient(erase(factory)));
        self
    }

    /// Lifetime registered for service type `T`.
    #[must_use]
    pub fn lifetime_of<T: Any>(&self) -> Option<Lifetime> {
        self.registrations
            .get(&ServiceKey::of::<T>())
            .map(Registration::lifetime)
    }
}

fn erase<T, F>(factory: F) -> Factory
where
    T: Any + Send + Sync,
    F: Fn() -> T + Send + Sync + 'static,
{
    Arc::new(move || Arc::new(factory()) as Service)
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_map()
            .entries(
                self.registrations
                    .iter()
                    .map(|(key, registration)| (key.type_name(), registration.lifetime())),
            )
            .finish()
    }
}

impl ServiceProvider for ServiceContainer {
    fn resolve(&self, param: &ServiceParam, scope: &mut ServiceScope) -> Option<Service> {
        let service = match self.registrations.get(&param.key())? {
            Registration::Instance(service) => Arc::clone(service),
            Registration::Lazy(cell, factory) => Arc::clone(cell.get_or_init(|| factory())),
            Registration::Scoped(factory) => scope.get_or_insert_with(param.key(), || factory()),
            Registration::Transient(factory) => factory(),
        };
        Some(service)
    }
}

/// Services resolved for one component construction.
#[derive(Debug, Default)]
pub struct ConstructorArgs {
    entries: Vec<(ServiceParam, Option<Service>)>,
}

impl ConstructorArgs {
    pub(crate) fn new(entries: Vec<(ServiceParam, Option<Service>)>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The service resolved for parameter `name`, if it resolved to a `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .iter()
            .find(|(param, _)| param.name() == name)
            .and_then(|(_, service)| service.clone())
            .and_then(|service| service.downcast::<T>().ok())
    }

    /// Like [`ConstructorArgs::get`] but absence is an error.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::MissingService`] when the service did not
    /// resolve.
    pub fn require<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, EndpointError> {
        self.get(name)
            .ok_or_else(|| EndpointError::missing_service(name))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rstest::rstest;

    use super::*;

    #[derive(Debug)]
    struct Counter(usize);

    fn counting_factory(built: &Arc<AtomicUsize>) -> impl Fn() -> Counter + Send + Sync + 'static {
        let built = Arc::clone(built);
        move || Counter(built.fetch_add(1, Ordering::SeqCst))
    }

    fn resolve_twice(container: &ServiceContainer, scope: &mut ServiceScope) -> (Service, Service) {
        let param = ServiceParam::of::<Counter>("counter");
        let first = container.resolve(&param, scope).expect("first");
        let second = container.resolve(&param, scope).expect("second");
        (first, second)
    }

    #[rstest]
    fn scoped_instances_are_shared_within_a_scope_only() {
        let built = Arc::new(AtomicUsize::new(0));
        let container = ServiceContainer::new().scoped(counting_factory(&built));
        let mut scope = container.open_scope();
        let (first, second) = resolve_twice(&container, &mut scope);
        assert!(Arc::ptr_eq(&first, &second));
        drop(scope);

        let mut next = container.open_scope();
        let (third, _) = resolve_twice(&container, &mut next);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    fn transient_instances_are_never_shared() {
        let built = Arc::new(AtomicUsize::new(0));
        let container = ServiceContainer::new().transient(counting_factory(&built));
        let mut scope = container.open_scope();
        let (first, second) = resolve_twice(&container, &mut scope);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(scope.is_empty());
    }

    #[rstest]
    fn lazy_singletons_are_built_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let container = ServiceContainer::new().lazy_singleton(counting_factory(&built));
        let (first, _) = resolve_twice(&container, &mut container.open_scope());
        let (second, _) = resolve_twice(&container, &mut container.open_scope());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(container.lifetime_of::<Counter>(), Some(Lifetime::Singleton));
    }

    #[rstest]
    fn constructor_args_downcast_by_name() {
        let container = ServiceContainer::new().singleton(Counter(9));
        let mut scope = container.open_scope();
        let param = ServiceParam::of::<Counter>("counter");
        let service = container.resolve(&param, &mut scope);
        let args = ConstructorArgs::new(vec![(param, service)]);
        assert_eq!(args.get::<Counter>("counter").map(|counter| counter.0), Some(9));
        assert!(args.get::<String>("counter").is_none());
        assert!(matches!(
            args.require::<Counter>("absent"),
            Err(EndpointError::MissingService { .. })
        ));
    }

    mod shadow {
        #[derive(Debug)]
        pub struct Counter(pub usize);
    }

    #[rstest]
    fn same_named_types_resolve_independently() {
        let container = ServiceContainer::new()
            .singleton(Counter(1))
            .singleton(shadow::Counter(2));
        let mut scope = container.open_scope();
        let ours = container.resolve(&ServiceParam::of::<Counter>("counter"), &mut scope);
        let theirs = container.resolve(&ServiceParam::of::<shadow::Counter>("counter"), &mut scope);
        let args = ConstructorArgs::new(vec![
            (ServiceParam::of::<Counter>("ours"), ours),
            (ServiceParam::of::<shadow::Counter>("theirs"), theirs),
        ]);
        assert_eq!(args.get::<Counter>("ours").map(|counter| counter.0), Some(1));
        assert_eq!(
            args.get::<shadow::Counter>("theirs").map(|counter| counter.0),
            Some(2)
        );
        assert_ne!(
            ServiceKey::of::<Counter>(),
            ServiceKey::of::<shadow::Counter>()
        );
    }

    #[rstest]
    fn unknown_services_resolve_to_none() {
        let container = ServiceContainer::new();
        let mut scope = container.open_scope();
        let param = ServiceParam::of::<Counter>("counter");
        assert!(container.resolve(&param, &mut scope).is_none());
    }
}
