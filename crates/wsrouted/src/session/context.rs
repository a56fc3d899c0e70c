//! Per-connection identity and the handle used to ask a session to close.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Identifier of one connection, unique within the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    /// Wraps an externally chosen identifier.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Allocates the next process-wide identifier.
    #[must_use]
    pub fn next() -> Self {
        let sequence = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        Self::new(format!("conn-{sequence:08x}"))
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Connection-level information visible to hooks and endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    id: ConnectionId,
    remote: Option<SocketAddr>,
    path: String,
}

impl ConnectionContext {
    /// Context for a freshly accepted connection; the path starts as `/`.
    #[must_use]
    pub fn new(id: ConnectionId, remote: Option<SocketAddr>) -> Self {
        Self {
            id,
            remote,
            path: String::from("/"),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Peer socket address; `None` for Unix socket peers.
    #[must_use]
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Request path of the upgrade request; `/` until the handshake runs.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Records the upgrade request path.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Caller address for diagnostics, or `local` for Unix socket peers.
    #[must_use]
    pub fn peer(&self) -> String {
        self.remote
            .map_or_else(|| String::from("local"), |remote| remote.to_string())
    }
}

type Interrupt = Box<dyn FnOnce() + Send>;

struct HandleInner {
    id: ConnectionId,
    remote: Option<SocketAddr>,
    opened_at: Instant,
    closing: Mutex<bool>,
    signal: Condvar,
    interrupt: Mutex<Option<Interrupt>>,
}

impl fmt::Debug for HandleInner {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HandleInner")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("opened_at", &self.opened_at)
            .field("closing", &self.closing)
            .finish_non_exhaustive()
    }
}

/// Shared handle on a live session.
///
/// Clones refer to the same session. Requesting close is the only way to
/// influence a session from outside its thread; the session notices the
/// request before its next read and while waiting for the transport to
/// settle.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    /// Opens a handle for the session serving `context`.
    #[must_use]
    pub fn new(context: &ConnectionContext) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: context.id().clone(),
                remote: context.remote(),
                opened_at: Instant::now(),
                closing: Mutex::new(false),
                signal: Condvar::new(),
                interrupt: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.inner.id
    }

    #[must_use]
    pub fn remote(&self) -> Option<SocketAddr> {
        self.inner.remote
    }

    /// Time since the session was opened.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.inner.opened_at.elapsed()
    }

    /// Asks the session to close; idempotent.
    pub fn request_close(&self) {
        {
            let mut closing = self
                .inner
                .closing
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *closing = true;
            self.inner.signal.notify_all();
        }
        let interrupt = self
            .inner
            .interrupt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(interrupt) = interrupt {
            interrupt();
        }
    }

    /// Installs a one-shot action run by [`SessionHandle::request_close`],
    /// used to unblock a session parked in a read.
    pub(crate) fn set_interrupt(&self, interrupt: impl FnOnce() + Send + 'static) {
        *self
            .inner
            .interrupt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(interrupt));
    }

    /// Drops the interrupt once the session no longer reads.
    pub(crate) fn clear_interrupt(&self) {
        self.inner
            .interrupt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Whether a close has been requested.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        *self
            .inner
            .closing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for up to `timeout`, returning early with `true` once close has
    /// been requested.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        let closing = self
            .inner
            .closing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (closing, _) = self
            .inner
            .signal
            .wait_timeout_while(closing, timeout, |closing| !*closing)
            .unwrap_or_else(PoisonError::into_inner);
        *closing
    }

    /// Whether both handles refer to the same session.
    #[must_use]
    pub fn same_session(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn allocated_ids_are_distinct() {
        let first = ConnectionId::next();
        let second = ConnectionId::next();
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("conn-"));
    }

    #[test]
    fn peer_falls_back_to_local() {
        let context = ConnectionContext::new(ConnectionId::new("a"), None);
        assert_eq!(context.peer(), "local");
        assert_eq!(context.path(), "/");
    }

    #[test]
    fn wait_returns_early_on_close_request() {
        let handle = SessionHandle::new(&ConnectionContext::new(ConnectionId::new("a"), None));
        let remote = handle.clone();
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.request_close();
        });
        let started = Instant::now();
        assert!(handle.wait(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(5));
        closer.join().expect("join closer");
    }

    #[test]
    fn close_request_runs_the_interrupt_once() {
        let handle = SessionHandle::new(&ConnectionContext::new(ConnectionId::new("a"), None));
        let (sender, receiver) = std::sync::mpsc::channel();
        handle.set_interrupt(move || sender.send(()).expect("send interrupt"));
        handle.request_close();
        handle.request_close();
        assert_eq!(receiver.try_iter().count(), 1);
        assert!(handle.is_closing());
    }

    #[test]
    fn wait_times_out_without_request() {
        let handle = SessionHandle::new(&ConnectionContext::new(ConnectionId::new("a"), None));
        assert!(!handle.wait(Duration::from_millis(10)));
        assert!(!handle.is_closing());
    }
}
