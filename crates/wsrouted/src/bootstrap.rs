//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use wsroute_config::{Config, SocketPreparationError};

use crate::endpoint::EndpointRegistry;
use crate::health::HealthReporter;
use crate::session::{RpcConnectionHandler, ServerOptions, SessionRegistry, SessionRuntime};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{ListenerError, ListenerHandle, SocketListener};

/// Trait abstracting configuration loading for testability.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when any configuration layer is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a configuration resolved earlier.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare listen socket: {source}")]
    Socket {
        #[source]
        source: SocketPreparationError,
    },
    /// The listener could not be bound or started.
    #[error("failed to start listener: {source}")]
    Listener {
        #[source]
        source: ListenerError,
    },
}

/// A bootstrapped daemon, ready to serve.
pub struct Daemon {
    config: Config,
    runtime: Arc<SessionRuntime>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Shared state handed to every session.
    #[must_use]
    pub fn runtime(&self) -> &Arc<SessionRuntime> {
        &self.runtime
    }

    /// Registry of live sessions.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        self.runtime.sessions()
    }

    /// Binds the configured endpoint and starts accepting connections.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Listener`] when the endpoint cannot be bound
    /// or the accept thread cannot be spawned.
    pub fn serve(&self) -> Result<ListenerHandle, BootstrapError> {
        let handler = Arc::new(RpcConnectionHandler::new(Arc::clone(&self.runtime)));
        let started = SocketListener::bind(self.config.listen())
            .and_then(|listener| listener.start(handler));
        match started {
            Ok(handle) => {
                self.reporter
                    .listener_started(&self.config, handle.local_addr());
                Ok(handle)
            }
            Err(source) => {
                let error = BootstrapError::Listener { source };
                self.reporter.bootstrap_failed(&error);
                Err(error)
            }
        }
    }

    /// Asks every live session to close, returning how many were asked.
    pub fn close_sessions(&self) -> usize {
        let count = self.sessions().request_close_all();
        self.reporter.shutdown_requested(count);
        count
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("config", &self.config)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration, telemetry or socket
/// preparation fails. Every failure is also passed to `reporter`.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    endpoints: Arc<EndpointRegistry>,
    options: ServerOptions,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    if let Err(source) = config.listen().prepare_filesystem() {
        let error = BootstrapError::Socket { source };
        reporter.bootstrap_failed(&error);
        return Err(error);
    }

    let routes = endpoints.len();
    let runtime = Arc::new(SessionRuntime::new(&config, endpoints, options));
    reporter.bootstrap_succeeded(&config, routes);

    Ok(Daemon {
        config,
        runtime,
        telemetry,
        reporter,
    })
}
