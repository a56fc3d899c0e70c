//! Supervises daemon launch sequencing and orderly shutdown.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::builtin::{builtin_endpoints, builtin_services};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::session::{ServerOptions, SessionRegistry};

use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::{DRAIN_TIMEOUT, PROCESS_TARGET};

const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Runs the daemon using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap fails, the shutdown signal cannot
/// be awaited, or the accept loop ends abnormally.
pub fn run_daemon() -> Result<(), LaunchError> {
    let reporter = Arc::new(StructuredHealthReporter::new());
    let shutdown = SystemShutdownSignal::new(DRAIN_TIMEOUT);
    run_daemon_with(&SystemConfigLoader, reporter, &shutdown)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    let endpoints = Arc::new(builtin_endpoints()?);
    let sessions = Arc::new(SessionRegistry::new());
    let options = ServerOptions::new()
        .with_services(Arc::new(builtin_services(Arc::clone(&sessions))))
        .with_sessions(sessions);
    let daemon = bootstrap_with(loader, reporter, endpoints, options)?;

    info!(
        target: PROCESS_TARGET,
        listen = %daemon.config().listen(),
        "starting daemon runtime"
    );
    let listener = daemon.serve()?;
    shutdown.wait()?;

    listener.shutdown();
    let asked = daemon.close_sessions();
    if !drain(daemon.sessions(), DRAIN_TIMEOUT) {
        warn!(
            target: PROCESS_TARGET,
            asked,
            remaining = daemon.sessions().len(),
            timeout_ms = DRAIN_TIMEOUT.as_millis(),
            "sessions still open after the drain timeout"
        );
    }
    listener.join()?;
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    Ok(())
}

/// Waits until no session is registered, returning whether that happened
/// within `timeout`.
fn drain(sessions: &SessionRegistry, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !sessions.is_empty() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(DRAIN_POLL);
    }
    true
}

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;
    use wsroute_config::{Config, SocketEndpoint};

    use super::*;
    use crate::bootstrap::StaticConfigLoader;
    use crate::process::shutdown::{MockShutdownSignal, ShutdownError};
    use crate::session::{ConnectionContext, ConnectionId, SessionHandle};

    fn loader() -> StaticConfigLoader {
        StaticConfigLoader::new(Config {
            listen: SocketEndpoint::tcp("127.0.0.1", 0),
            log_filter: String::from("off"),
            ..Config::default()
        })
    }

    fn handle(id: &str) -> SessionHandle {
        SessionHandle::new(&ConnectionContext::new(ConnectionId::new(id), None))
    }

    #[rstest]
    fn daemon_stops_after_the_shutdown_signal() {
        let mut shutdown = MockShutdownSignal::new();
        shutdown.expect_wait().times(1).returning(|| Ok(()));
        let outcome = run_daemon_with(
            &loader(),
            Arc::new(StructuredHealthReporter::new()),
            &shutdown,
        );
        assert!(outcome.is_ok(), "unexpected launch failure: {outcome:?}");
    }

    #[rstest]
    fn signal_installation_failures_surface() {
        let mut shutdown = MockShutdownSignal::new();
        shutdown.expect_wait().times(1).returning(|| {
            Err(ShutdownError::Install {
                source: io::Error::other("no signals here"),
            })
        });
        let outcome = run_daemon_with(
            &loader(),
            Arc::new(StructuredHealthReporter::new()),
            &shutdown,
        );
        assert!(matches!(outcome, Err(LaunchError::Shutdown { .. })));
    }

    #[rstest]
    fn drain_returns_once_sessions_unregister() {
        let sessions = Arc::new(SessionRegistry::new());
        let session = handle("conn-drain");
        assert!(sessions.try_register(&session));
        let worker = {
            let sessions = Arc::clone(&sessions);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                sessions.unregister(&session);
            })
        };
        assert!(drain(&sessions, Duration::from_secs(5)));
        worker.join().expect("join worker");
    }

    #[rstest]
    fn drain_gives_up_at_the_deadline() {
        let sessions = SessionRegistry::new();
        assert!(sessions.try_register(&handle("conn-stuck")));
        assert!(!drain(&sessions, Duration::from_millis(30)));
    }
}
