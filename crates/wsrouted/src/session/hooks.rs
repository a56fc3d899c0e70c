//! Connection gate and disconnect notifications.
//!
//! Two layers are consulted: the hooks supplied with the server, then the
//! process-wide [`GlobalHooks`] from the server options. Either layer can veto
//! a connection. Disconnect notifications run for both layers even when one
//! of them fails.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::transport::CloseStatus;

use super::{ConnectionContext, SESSION_TARGET};

/// Failure reported by a disconnect hook.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Lifecycle callbacks supplied alongside the endpoint registry.
pub trait SessionHooks: Send + Sync {
    /// Runs after the upgrade request is read; `false` rejects the connection.
    fn before_connection(&self, _context: &ConnectionContext) -> bool {
        true
    }

    /// Runs once the session has ended, however it ended.
    ///
    /// # Errors
    ///
    /// Failures are logged and otherwise ignored.
    fn on_disconnected(
        &self,
        _context: &ConnectionContext,
        _status: Option<CloseStatus>,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

/// Hooks that accept every connection and ignore disconnects.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl SessionHooks for NoHooks {}

type GateFn = dyn Fn(&ConnectionContext) -> bool + Send + Sync;
type DisconnectFn =
    dyn Fn(&ConnectionContext, Option<CloseStatus>) -> Result<(), HookError> + Send + Sync;

/// Optional process-wide hooks configured on the server options.
#[derive(Clone, Default)]
pub struct GlobalHooks {
    before_connection: Option<Arc<GateFn>>,
    on_disconnected: Option<Arc<DisconnectFn>>,
}

impl GlobalHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn before_connection(
        mut self,
        gate: impl Fn(&ConnectionContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.before_connection = Some(Arc::new(gate));
        self
    }

    #[must_use]
    pub fn on_disconnected(
        mut self,
        hook: impl Fn(&ConnectionContext, Option<CloseStatus>) -> Result<(), HookError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.on_disconnected = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for GlobalHooks {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GlobalHooks")
            .field("before_connection", &self.before_connection.is_some())
            .field("on_disconnected", &self.on_disconnected.is_some())
            .finish()
    }
}

/// Both hook layers in the order they are consulted.
pub(crate) struct HookChain<'a> {
    handler: &'a dyn SessionHooks,
    global: &'a GlobalHooks,
}

impl<'a> HookChain<'a> {
    pub(crate) fn new(handler: &'a dyn SessionHooks, global: &'a GlobalHooks) -> Self {
        Self { handler, global }
    }

    /// Handler gate first, then the global gate. A panicking gate vetoes.
    pub(crate) fn admit(&self, context: &ConnectionContext) -> bool {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.handler.before_connection(context)
                && self
                    .global
                    .before_connection
                    .as_ref()
                    .is_none_or(|gate| gate(context))
        }));
        outcome.unwrap_or_else(|_| {
            warn!(
                target: SESSION_TARGET,
                connection = %context.id(),
                "connection gate panicked; rejecting connection"
            );
            false
        })
    }

    /// Notifies both layers, logging rather than propagating failures.
    pub(crate) fn disconnected(&self, context: &ConnectionContext, status: Option<CloseStatus>) {
        notify(context, "handler", || {
            self.handler.on_disconnected(context, status)
        });
        if let Some(hook) = &self.global.on_disconnected {
            notify(context, "global", || hook(context, status));
        }
    }
}

fn notify(
    context: &ConnectionContext,
    layer: &'static str,
    hook: impl FnOnce() -> Result<(), HookError>,
) {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(
            target: SESSION_TARGET,
            connection = %context.id(),
            layer,
            error = %error,
            "disconnect hook failed"
        ),
        Err(_) => warn!(
            target: SESSION_TARGET,
            connection = %context.id(),
            layer,
            "disconnect hook panicked"
        ),
    }
}
