//! Endpoint results, immediate or deferred.

use std::sync::mpsc;
use std::thread;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::{ENDPOINT_TARGET, EndpointError};

/// What an endpoint method hands back to the dispatcher.
#[derive(Debug)]
pub enum Reply {
    /// The result is already known.
    Ready(Value),
    /// The result will be delivered later; the dispatcher waits for it.
    Deferred(Deferred),
}

impl Reply {
    /// A reply with no body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Ready(Value::Null)
    }

    /// Serialises `value` into an immediate reply.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Serialise`] when `value` cannot be rendered
    /// as JSON.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, EndpointError> {
        Ok(Self::Ready(serde_json::to_value(value)?))
    }

    /// Settles the reply, blocking on deferred results.
    pub(crate) fn resolve(self) -> Result<Value, EndpointError> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::Deferred(deferred) => deferred.wait(),
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Ready(value)
    }
}

impl From<Deferred> for Reply {
    fn from(deferred: Deferred) -> Self {
        Self::Deferred(deferred)
    }
}

type Outcome = Result<Value, EndpointError>;

/// A result that some other thread will produce.
///
/// If the producing side goes away without completing (including when a
/// worker thread panics) the wait fails with [`EndpointError::Abandoned`].
#[derive(Debug)]
pub struct Deferred {
    receiver: mpsc::Receiver<Outcome>,
}

/// Producing side of a [`Deferred`].
#[derive(Debug)]
pub struct Completer {
    sender: mpsc::SyncSender<Outcome>,
}

impl Completer {
    /// Delivers the result; a waiter that has gone away is ignored.
    pub fn complete(self, outcome: Outcome) {
        if self.sender.send(outcome).is_err() {
            warn!(
                target: ENDPOINT_TARGET,
                "deferred result completed after its waiter went away"
            );
        }
    }
}

impl Deferred {
    /// Creates a linked completer and deferred result.
    #[must_use]
    pub fn channel() -> (Completer, Self) {
        let (sender, receiver) = mpsc::sync_channel(1);
        (Completer { sender }, Self { receiver })
    }

    /// Runs `work` on a fresh thread.
    #[must_use]
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce() -> Outcome + Send + 'static,
    {
        let (completer, deferred) = Self::channel();
        let spawned = thread::Builder::new()
            .name("wsroute-deferred".to_owned())
            .spawn(move || completer.complete(work()));
        if let Err(error) = spawned {
            warn!(
                target: ENDPOINT_TARGET,
                error = %error,
                "failed to spawn deferred worker"
            );
        }
        deferred
    }

    /// Blocks until the result arrives.
    ///
    /// # Errors
    ///
    /// Returns the endpoint's own error, or [`EndpointError::Abandoned`] when
    /// the completer was dropped.
    pub fn wait(self) -> Outcome {
        self.receiver.recv().map_err(|_| EndpointError::Abandoned)?
    }
}
