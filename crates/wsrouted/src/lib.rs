//! Connection-scoped WebSocket RPC daemon.
//!
//! Every accepted WebSocket connection becomes a session that reads JSON
//! request envelopes (`{id, target, body}`), routes each one to a registered
//! endpoint by case-insensitive name, binds the body's named values to the
//! endpoint's declared parameters, and writes exactly one response envelope
//! back on the same connection. Requests on a connection are served in
//! order; connections are served concurrently, one thread each.
//!
//! The crate is layered bottom-up:
//!
//! - [`transport`] binds the listen socket and exposes each connection as a
//!   message-oriented [`Transport`](transport::Transport).
//! - [`endpoint`] holds the registry of routes, their parameters and the
//!   components that host them; [`services`] resolves the components'
//!   constructor dependencies.
//! - [`dispatch`] decodes envelopes and runs one request through
//!   [`Dispatcher::distribute`](dispatch::Dispatcher::distribute).
//! - [`session`] drives a connection through its lifecycle and tracks live
//!   sessions.
//!
//! [`bootstrap_with`] loads configuration and telemetry and returns a
//! [`Daemon`] ready to serve; [`run_daemon`] adds signal handling and an
//! orderly shutdown around it.

mod bootstrap;
pub mod builtin;
pub mod dispatch;
pub mod endpoint;
mod health;
mod process;
pub mod services;
pub mod session;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
