//! Bridges accepted sockets into WebSocket sessions.

use std::sync::Arc;

use tracing::debug;

use crate::transport::{ConnectionHandler, ConnectionStream, WebSocketAcceptor};

use super::{ConnectionContext, ConnectionId, ConnectionSession, SESSION_TARGET, SessionRuntime};

/// Serves each accepted stream as one WebSocket RPC session.
#[derive(Debug, Clone)]
pub(crate) struct RpcConnectionHandler {
    runtime: Arc<SessionRuntime>,
}

impl RpcConnectionHandler {
    pub(crate) fn new(runtime: Arc<SessionRuntime>) -> Self {
        Self { runtime }
    }
}

impl ConnectionHandler for RpcConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        let context = ConnectionContext::new(ConnectionId::next(), stream.peer_addr());
        let session = ConnectionSession::new(Arc::clone(&self.runtime), context);
        match stream.try_clone() {
            Ok(reader) => session.handle().set_interrupt(move || {
                if let Err(error) = reader.shutdown_read() {
                    debug!(target: SESSION_TARGET, %error, "failed to interrupt session read");
                }
            }),
            Err(error) => {
                debug!(target: SESSION_TARGET, %error, "session reads cannot be interrupted");
            }
        }
        let max_message_bytes = self.runtime.limits().max_request_bytes;
        let report = session.run(WebSocketAcceptor::new(stream, max_message_bytes));
        debug!(
            target: SESSION_TARGET,
            state = ?report.state,
            served = report.served,
            registered = report.registered,
            "session finished"
        );
    }
}
