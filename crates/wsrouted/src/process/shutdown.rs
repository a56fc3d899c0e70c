//! Termination signals that start the daemon's drain sequence.

use std::io;
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Signals that stop the daemon.
pub const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Blocks the launcher until the daemon should stop accepting connections.
#[cfg_attr(test, mockall::automock)]
pub trait ShutdownSignal: Send + Sync {
    /// Returns once shutdown should begin.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when the notification source cannot be set up.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported while waiting for shutdown.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Registering for [`TERMINATION_SIGNALS`] failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        #[source]
        source: io::Error,
    },
}

/// Waits for one of [`TERMINATION_SIGNALS`].
#[derive(Debug, Clone)]
pub struct SystemShutdownSignal {
    drain: Duration,
}

impl SystemShutdownSignal {
    /// `drain` is how long sessions get to close once the signal arrives.
    #[must_use]
    pub fn new(drain: Duration) -> Self {
        Self { drain }
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals =
            Signals::new(TERMINATION_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        if let Some(signal) = signals.forever().next() {
            info!(
                target: PROCESS_TARGET,
                signal,
                drain_ms = self.drain.as_millis(),
                "termination signal received; closing listener and draining sessions"
            );
        }
        Ok(())
    }
}
