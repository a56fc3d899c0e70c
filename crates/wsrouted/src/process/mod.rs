//! Process lifecycle: launch, signal handling and orderly shutdown.

use std::time::Duration;

mod errors;
pub(crate) mod launch;
pub(crate) mod shutdown;

pub use errors::LaunchError;
pub use launch::run_daemon;
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
/// How long live sessions get to finish their close handshakes.
pub(crate) const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
