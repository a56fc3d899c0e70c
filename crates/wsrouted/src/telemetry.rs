//! Log output for the RPC daemon.
//!
//! Everything goes to stderr through one global `tracing` subscriber built
//! from `log_filter` and `log_format`. Events carry their target (for
//! example `wsrouted::session` or `wsrouted::dispatch`) and the name of the
//! emitting thread, and are stamped with RFC 3339 UTC times. JSON output
//! flattens event fields into the top-level object so `connection`, `remote`
//! and `route` can be queried directly.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::UtcTime;

use wsroute_config::{Config, LogFormat};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Proof that the daemon's subscriber is in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// `log_filter` is not a valid filter directive list.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Another subscriber is already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the daemon subscriber once per process.
///
/// Only the first successful call reads `config`; later calls, including
/// those from daemons started after it in the same process, get a handle to
/// the subscriber already installed.
///
/// # Errors
///
/// Returns [`TelemetryError`] when `log_filter` does not parse or a foreign
/// subscriber was installed first.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install(config))
        .map(|_| TelemetryHandle)
}

fn parse_filter(config: &Config) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))
}

fn install(config: &Config) -> Result<(), TelemetryError> {
    let filter = parse_filter(config)?;
    let stderr_is_terminal = io::stderr().is_terminal();
    let base = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(false);

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(
            base.with_ansi(false)
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish(),
        ),
        LogFormat::Compact => Box::new(base.with_ansi(stderr_is_terminal).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn with_filter(filter: &str) -> Config {
        Config {
            log_filter: filter.to_owned(),
            ..Config::default()
        }
    }

    #[rstest]
    #[case("info")]
    #[case("wsrouted::session=trace,warn")]
    fn accepts_directive_lists(#[case] filter: &str) {
        assert!(parse_filter(&with_filter(filter)).is_ok());
    }

    #[rstest]
    fn rejects_malformed_directives() {
        let error = parse_filter(&with_filter("wsrouted=loud")).expect_err("malformed filter");
        assert!(matches!(error, TelemetryError::Filter(_)));
    }
}
