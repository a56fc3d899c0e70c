//! Per-connection state machine.
//!
//! A session moves `Accepting → Open → Closing → Closed`, or ends `Aborted`
//! when the handshake or the transport fails. Requests on one connection are
//! served strictly in order: the next message is not read until the response
//! to the previous one has been sent.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::dispatch::{CodecError, Response, timestamp_micros};
use crate::transport::{Acceptor, CloseStatus, MessageKind, Transport, TransportState};

use super::{
    ConnectionContext, MessageReassembler, Reassembled, SESSION_TARGET, SessionHandle,
    SessionRuntime,
};

/// How long to wait before re-checking a transport that is still connecting.
const SETTLE_DELAY: Duration = Duration::from_millis(250);

const DUPLICATE_DESCRIPTION: &str = "connection already exists";
const REQUESTED_DESCRIPTION: &str = "session closed by server";

/// Lifecycle state of a [`ConnectionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Accepting,
    Open,
    Closing,
    Closed,
    Aborted,
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub state: SessionState,
    /// Responses sent, including failure responses to unparsable messages.
    pub served: usize,
    pub registered: bool,
    /// Close status received from the peer, or the one this side sent.
    pub close_status: Option<CloseStatus>,
}

/// Serves a single connection from handshake to disconnect.
#[derive(Debug)]
pub struct ConnectionSession {
    runtime: Arc<SessionRuntime>,
    context: ConnectionContext,
    handle: SessionHandle,
    state: SessionState,
    opened: bool,
    served: usize,
}

impl ConnectionSession {
    #[must_use]
    pub fn new(runtime: Arc<SessionRuntime>, context: ConnectionContext) -> Self {
        let handle = SessionHandle::new(&context);
        Self {
            runtime,
            context,
            handle,
            state: SessionState::Accepting,
            opened: false,
            served: 0,
        }
    }

    /// Handle that can ask this session to close from another thread.
    #[must_use]
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session to completion on the calling thread.
    pub fn run<A: Acceptor>(mut self, acceptor: A) -> SessionReport {
        let runtime = Arc::clone(&self.runtime);
        let accepted = acceptor.accept(&mut self.context, &mut |context: &ConnectionContext| {
            runtime.hooks().admit(context)
        });

        let mut registered = false;
        let mut close_status = None;
        match accepted {
            Ok(Some(mut transport)) => {
                info!(
                    target: SESSION_TARGET,
                    connection = %self.context.id(),
                    remote = %self.context.peer(),
                    path = self.context.path(),
                    "connection opened"
                );
                self.state = SessionState::Open;
                self.opened = true;
                registered = runtime.sessions().try_register(&self.handle);
                close_status = self.drive(&mut transport, registered);
            }
            Ok(None) => {
                debug!(
                    target: SESSION_TARGET,
                    connection = %self.context.id(),
                    remote = %self.context.peer(),
                    path = self.context.path(),
                    "connection rejected by gate"
                );
                self.state = SessionState::Closed;
            }
            Err(error) => {
                debug!(
                    target: SESSION_TARGET,
                    connection = %self.context.id(),
                    remote = %self.context.peer(),
                    %error,
                    "handshake failed"
                );
                self.state = SessionState::Aborted;
            }
        }

        self.handle.clear_interrupt();
        runtime.hooks().disconnected(&self.context, close_status);
        runtime.sessions().unregister(&self.handle);
        self.log_disconnect(close_status);

        SessionReport {
            state: self.state,
            served: self.served,
            registered,
            close_status,
        }
    }

    fn drive(&mut self, transport: &mut dyn Transport, registered: bool) -> Option<CloseStatus> {
        if !registered {
            if self.runtime.limits().allow_duplicate_connections {
                debug!(
                    target: SESSION_TARGET,
                    connection = %self.context.id(),
                    remote = %self.context.peer(),
                    "connection id already registered; serving unregistered"
                );
            } else {
                warn!(
                    target: SESSION_TARGET,
                    connection = %self.context.id(),
                    remote = %self.context.peer(),
                    "connection id already registered; closing duplicate"
                );
                self.state = SessionState::Closing;
                return self.finish(
                    transport,
                    Some((CloseStatus::POLICY_VIOLATION, DUPLICATE_DESCRIPTION)),
                );
            }
        }

        self.serve(transport);
        self.state = SessionState::Closing;
        let requested = self
            .handle
            .is_closing()
            .then_some((CloseStatus::NORMAL_CLOSURE, REQUESTED_DESCRIPTION));
        self.finish(transport, requested)
    }

    fn serve(&mut self, transport: &mut dyn Transport) {
        let limits = self.runtime.limits();
        let mut reassembler =
            MessageReassembler::new(limits.receive_buffer_bytes, limits.max_request_bytes);
        loop {
            if self.handle.is_closing() {
                return;
            }
            let state = transport.state();
            if !state.is_receivable() {
                if state.is_terminal() || self.handle.wait(SETTLE_DELAY) {
                    return;
                }
                continue;
            }

            match reassembler.next_message(transport) {
                Ok(Reassembled::Message {
                    kind,
                    end_of_message,
                }) => {
                    let response = self.respond(reassembler.payload());
                    if !self.send(transport, &response, kind, end_of_message) {
                        return;
                    }
                }
                Ok(Reassembled::Oversized { size }) => {
                    trace!(
                        target: SESSION_TARGET,
                        connection = %self.context.id(),
                        remote = %self.context.peer(),
                        size,
                        limit = limits.max_request_bytes,
                        "request exceeds the size limit; discarded"
                    );
                }
                Ok(Reassembled::Closed {
                    status,
                    description,
                }) => {
                    debug!(
                        target: SESSION_TARGET,
                        connection = %self.context.id(),
                        remote = %self.context.peer(),
                        status = ?status.map(CloseStatus::code),
                        description = description.as_deref().unwrap_or_default(),
                        "transport stopped receiving"
                    );
                    return;
                }
                Err(error) => {
                    debug!(
                        target: SESSION_TARGET,
                        connection = %self.context.id(),
                        remote = %self.context.peer(),
                        %error,
                        "receive failed"
                    );
                    return;
                }
            }
        }
    }

    fn respond(&self, payload: &[u8]) -> Response {
        let request_time = timestamp_micros();
        match self.runtime.codec().decode(payload) {
            Ok(request) => {
                self.runtime
                    .dispatcher()
                    .distribute(&self.context, &self.handle, &request)
            }
            Err(error) => {
                debug!(
                    target: SESSION_TARGET,
                    connection = %self.context.id(),
                    remote = %self.context.peer(),
                    %error,
                    "request could not be parsed"
                );
                self.parse_failure(&error, request_time)
            }
        }
    }

    fn parse_failure(&self, error: &CodecError, request_time: u64) -> Response {
        let msg = self
            .runtime
            .development()
            .then(|| format!("{} -> request parsing error\n{error}", self.context.peer()));
        Response::failure(error.request_id(), None, msg, request_time)
    }

    /// Returns whether the session can keep serving.
    fn send(
        &mut self,
        transport: &mut dyn Transport,
        response: &Response,
        kind: MessageKind,
        end_of_message: bool,
    ) -> bool {
        let encoded = match self.runtime.codec().encode(response) {
            Ok(encoded) => encoded,
            Err(error) => {
                warn!(
                    target: SESSION_TARGET,
                    connection = %self.context.id(),
                    remote = %self.context.peer(),
                    route = response.target.as_deref().unwrap_or_default(),
                    %error,
                    "response could not be encoded; dropped"
                );
                return true;
            }
        };
        match transport.send(kind, &encoded, end_of_message) {
            Ok(()) => {
                self.served += 1;
                true
            }
            Err(error) => {
                debug!(
                    target: SESSION_TARGET,
                    connection = %self.context.id(),
                    remote = %self.context.peer(),
                    route = response.target.as_deref().unwrap_or_default(),
                    %error,
                    "send failed"
                );
                false
            }
        }
    }

    /// Issues the closing handshake when the transport can still take one.
    ///
    /// `forced` overrides the status chosen from the transport and also
    /// applies to aborted transports.
    fn finish(
        &mut self,
        transport: &mut dyn Transport,
        forced: Option<(CloseStatus, &str)>,
    ) -> Option<CloseStatus> {
        let state = transport.state();
        let peer_status = transport.close_status();
        let (status, description) = match forced {
            Some((status, description)) => (status, description.to_owned()),
            None => (
                peer_status.unwrap_or(if state == TransportState::Aborted {
                    CloseStatus::INTERNAL_SERVER_ERROR
                } else {
                    CloseStatus::NORMAL_CLOSURE
                }),
                transport.close_description().unwrap_or_default().to_owned(),
            ),
        };
        let should_close = match state {
            TransportState::Open | TransportState::CloseSent | TransportState::CloseReceived => {
                true
            }
            TransportState::Aborted => forced.is_some(),
            TransportState::Connecting | TransportState::Closed => false,
        };

        let mut sent = None;
        if should_close {
            match transport.close(status, &description) {
                Ok(()) => sent = Some(status),
                Err(error) => debug!(
                    target: SESSION_TARGET,
                    connection = %self.context.id(),
                    remote = %self.context.peer(),
                    %error,
                    "close handshake failed"
                ),
            }
        }

        self.state = if transport.state() == TransportState::Aborted {
            SessionState::Aborted
        } else {
            SessionState::Closed
        };
        peer_status.or(sent)
    }

    fn log_disconnect(&self, status: Option<CloseStatus>) {
        let detail = match status {
            Some(status) => status.describe(),
            None if self.opened => "connection shutting down",
            None => "no handshake succeeded",
        };
        info!(
            target: SESSION_TARGET,
            connection = %self.context.id(),
            remote = %self.context.peer(),
            status = ?status.map(CloseStatus::code),
            served = self.served,
            uptime_ms = u64::try_from(self.handle.uptime().as_millis()).unwrap_or(u64::MAX),
            "disconnected: {detail}"
        );
    }
}
