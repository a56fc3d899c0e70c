//! State shared by every session served by one daemon.

use std::fmt;
use std::sync::Arc;

use wsroute_config::Config;

use crate::dispatch::{DispatchSettings, Dispatcher, EnvelopeCodec};
use crate::endpoint::EndpointRegistry;
use crate::services::ServiceProvider;

use super::{GlobalHooks, HookChain, NoHooks, SessionHooks, SessionRegistry};

/// Programmatic collaborators supplied alongside the loaded [`Config`].
#[derive(Clone)]
pub struct ServerOptions {
    services: Option<Arc<dyn ServiceProvider>>,
    hooks: Arc<dyn SessionHooks>,
    global_hooks: GlobalHooks,
    sessions: Arc<SessionRegistry>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            services: None,
            hooks: Arc::new(NoHooks),
            global_hooks: GlobalHooks::default(),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }
}

impl ServerOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Source of constructor dependencies for endpoint components.
    #[must_use]
    pub fn with_services(mut self, services: Arc<dyn ServiceProvider>) -> Self {
        self.services = Some(services);
        self
    }

    /// Handler-level connection hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Process-wide hooks consulted after the handler-level ones.
    #[must_use]
    pub fn with_global_hooks(mut self, global_hooks: GlobalHooks) -> Self {
        self.global_hooks = global_hooks;
        self
    }

    /// Shares an existing registry, for example one also exposed as a service.
    #[must_use]
    pub fn with_sessions(mut self, sessions: Arc<SessionRegistry>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Registry the sessions will be recorded in.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ServerOptions")
            .field("services", &self.services.is_some())
            .field("global_hooks", &self.global_hooks)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

/// Limits applied to each session's read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SessionLimits {
    pub(crate) max_request_bytes: usize,
    pub(crate) receive_buffer_bytes: usize,
    pub(crate) allow_duplicate_connections: bool,
}

/// Codec, dispatcher, hooks and registry behind every connection.
pub struct SessionRuntime {
    codec: EnvelopeCodec,
    dispatcher: Dispatcher,
    hooks: Arc<dyn SessionHooks>,
    global_hooks: GlobalHooks,
    sessions: Arc<SessionRegistry>,
    limits: SessionLimits,
    development: bool,
}

impl SessionRuntime {
    /// Assembles the shared per-connection machinery from configuration.
    #[must_use]
    pub fn new(config: &Config, endpoints: Arc<EndpointRegistry>, options: ServerOptions) -> Self {
        let ServerOptions {
            services,
            hooks,
            global_hooks,
            sessions,
        } = options;
        Self {
            codec: EnvelopeCodec::from_config(config),
            dispatcher: Dispatcher::new(endpoints, services, DispatchSettings::from_config(config)),
            hooks,
            global_hooks,
            sessions,
            limits: SessionLimits {
                max_request_bytes: config.max_request_bytes(),
                receive_buffer_bytes: config.receive_buffer_bytes(),
                allow_duplicate_connections: config.allow_duplicate_connections(),
            },
            development: config.development(),
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub(crate) fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    pub(crate) fn hooks(&self) -> HookChain<'_> {
        HookChain::new(self.hooks.as_ref(), &self.global_hooks)
    }

    pub(crate) fn limits(&self) -> SessionLimits {
        self.limits
    }

    pub(crate) fn development(&self) -> bool {
        self.development
    }
}

impl fmt::Debug for SessionRuntime {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionRuntime")
            .field("codec", &self.codec)
            .field("dispatcher", &self.dispatcher)
            .field("limits", &self.limits)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
