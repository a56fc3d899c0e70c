//! WebSocket transport backed by `tungstenite`.
//!
//! `tungstenite` reassembles continuation frames itself, so a complete
//! message is buffered here and handed out in receive-buffer sized fragments.
//! The socket caps messages at the session's request limit: a message over
//! the cap is consumed and reported as [`Received::Oversized`], and the
//! connection keeps serving. Single frames larger than the frame cap (four
//! times the request limit, at least [`MIN_FRAME_CAP`]) are rejected before
//! their payload is read and abort the connection.

use std::borrow::Cow;
use std::cell::Cell;
use std::io::{self, Read, Write};

use tracing::debug;
use tungstenite::error::CapacityError;
use tungstenite::handshake::HandshakeError;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tungstenite::{Message, WebSocket};

use crate::session::ConnectionContext;

use super::{
    Acceptor, CloseStatus, LISTENER_TARGET, MessageKind, Received, Transport, TransportError,
    TransportState,
};

/// Frame cap used when the request limit is smaller.
pub(crate) const MIN_FRAME_CAP: usize = 256 << 20;

/// Performs the server side of the WebSocket upgrade on an accepted stream.
#[derive(Debug)]
pub(crate) struct WebSocketAcceptor<S> {
    stream: S,
    max_message_bytes: usize,
}

impl<S> WebSocketAcceptor<S> {
    /// Upgrades `stream`, capping inbound messages at `max_message_bytes`.
    pub(crate) fn new(stream: S, max_message_bytes: usize) -> Self {
        Self {
            stream,
            max_message_bytes,
        }
    }

    fn socket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_bytes);
        config.max_frame_size = Some(
            self.max_message_bytes
                .saturating_mul(4)
                .max(MIN_FRAME_CAP),
        );
        config
    }
}

impl<S> Acceptor for WebSocketAcceptor<S>
where
    S: Read + Write + Send,
{
    type Transport = WebSocketTransport<S>;

    fn accept(
        self,
        context: &mut ConnectionContext,
        admit: &mut dyn FnMut(&ConnectionContext) -> bool,
    ) -> Result<Option<Self::Transport>, TransportError> {
        let config = self.socket_config();
        let max_message_bytes = self.max_message_bytes;
        let rejected = Cell::new(false);
        let callback = |request: &Request, response: Response| {
            context.set_path(request.uri().path());
            if admit(context) {
                Ok(response)
            } else {
                rejected.set(true);
                Err(rejection())
            }
        };
        match tungstenite::accept_hdr_with_config(self.stream, callback, Some(config)) {
            Ok(socket) => Ok(Some(WebSocketTransport::new(socket, max_message_bytes))),
            Err(_) if rejected.get() => Ok(None),
            Err(HandshakeError::Interrupted(_)) => {
                Err(TransportError::handshake("handshake interrupted"))
            }
            Err(HandshakeError::Failure(error)) => Err(TransportError::handshake(error.to_string())),
        }
    }
}

fn rejection() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("connection rejected".to_owned()));
    *response.status_mut() = StatusCode::FORBIDDEN;
    response
}

/// An open WebSocket connection.
#[derive(Debug)]
pub(crate) struct WebSocketTransport<S> {
    socket: WebSocket<S>,
    max_message_bytes: usize,
    state: TransportState,
    pending: Option<PendingMessage>,
    close_status: Option<CloseStatus>,
    close_description: Option<String>,
}

#[derive(Debug)]
struct PendingMessage {
    kind: MessageKind,
    payload: Vec<u8>,
    offset: usize,
}

impl PendingMessage {
    fn copy_into(&mut self, buffer: &mut [u8]) -> usize {
        let remaining = self.payload.get(self.offset..).unwrap_or_default();
        let count = remaining.len().min(buffer.len());
        if let (Some(target), Some(source)) = (buffer.get_mut(..count), remaining.get(..count)) {
            target.copy_from_slice(source);
        }
        self.offset += count;
        count
    }

    fn is_drained(&self) -> bool {
        self.offset >= self.payload.len()
    }
}

enum Incoming {
    Data(PendingMessage),
    Oversized(usize),
    Close,
}

impl<S> WebSocketTransport<S>
where
    S: Read + Write,
{
    pub(crate) fn new(socket: WebSocket<S>, max_message_bytes: usize) -> Self {
        Self {
            socket,
            max_message_bytes,
            state: TransportState::Open,
            pending: None,
            close_status: None,
            close_description: None,
        }
    }

    fn read_incoming(&mut self) -> Result<Incoming, TransportError> {
        loop {
            match self.socket.read() {
                Ok(Message::Text(text)) => {
                    return Ok(Incoming::Data(PendingMessage {
                        kind: MessageKind::Text,
                        payload: text.into_bytes(),
                        offset: 0,
                    }));
                }
                Ok(Message::Binary(payload)) => {
                    return Ok(Incoming::Data(PendingMessage {
                        kind: MessageKind::Binary,
                        payload,
                        offset: 0,
                    }));
                }
                Ok(Message::Close(frame)) => {
                    if let Some(frame) = frame {
                        self.close_status = Some(CloseStatus::from_code(u16::from(frame.code)));
                        self.close_description = Some(frame.reason.into_owned());
                    }
                    self.state = TransportState::CloseReceived;
                    return Ok(Incoming::Close);
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(tungstenite::Error::Capacity(CapacityError::MessageTooLong {
                    size,
                    max_size,
                })) if max_size == self.max_message_bytes => {
                    debug!(
                        target: LISTENER_TARGET,
                        size,
                        limit = max_size,
                        "oversized message dropped by the socket"
                    );
                    return Ok(Incoming::Oversized(size));
                }
                Err(error) => return Err(self.absorb(error)),
            }
        }
    }

    /// Maps a `tungstenite` error and updates the lifecycle state.
    fn absorb(&mut self, error: tungstenite::Error) -> TransportError {
        match error {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                self.state = TransportState::Closed;
                TransportError::Closed
            }
            tungstenite::Error::Io(source) => {
                self.state = TransportState::Aborted;
                TransportError::Io(source)
            }
            other => {
                self.state = TransportState::Aborted;
                TransportError::protocol(other.to_string())
            }
        }
    }
}

impl<S> Transport for WebSocketTransport<S>
where
    S: Read + Write + Send,
{
    fn state(&self) -> TransportState {
        self.state
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<Received, TransportError> {
        let mut pending = match self.pending.take() {
            Some(pending) => pending,
            None => match self.read_incoming()? {
                Incoming::Data(pending) => pending,
                Incoming::Oversized(size) => return Ok(Received::Oversized { size }),
                Incoming::Close => {
                    return Ok(Received::Close {
                        status: self.close_status,
                        description: self.close_description.clone().unwrap_or_default(),
                    });
                }
            },
        };
        let count = pending.copy_into(buffer);
        let kind = pending.kind;
        let end_of_message = pending.is_drained();
        if !end_of_message {
            self.pending = Some(pending);
        }
        Ok(Received::Data {
            kind,
            count,
            end_of_message,
        })
    }

    fn send(
        &mut self,
        kind: MessageKind,
        payload: &[u8],
        end_of_message: bool,
    ) -> Result<(), TransportError> {
        if !end_of_message {
            debug!(
                target: LISTENER_TARGET,
                "partial sends are delivered as whole messages"
            );
        }
        let message = match kind {
            MessageKind::Text => Message::Text(
                String::from_utf8(payload.to_vec()).map_err(|_| TransportError::InvalidText)?,
            ),
            MessageKind::Binary => Message::Binary(payload.to_vec()),
        };
        self.socket.send(message).map_err(|error| self.absorb(error))
    }

    fn close(&mut self, status: CloseStatus, description: &str) -> Result<(), TransportError> {
        if self.state == TransportState::Closed {
            return Ok(());
        }
        let frame = CloseFrame {
            code: CloseCode::from(status.code()),
            reason: Cow::Owned(description.to_owned()),
        };
        let outcome = self
            .socket
            .close(Some(frame))
            .and_then(|()| self.socket.flush());
        self.state = match self.state {
            TransportState::CloseReceived | TransportState::Aborted => TransportState::Closed,
            _ => TransportState::CloseSent,
        };
        match outcome {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(tungstenite::Error::Io(source)) if source.kind() == io::ErrorKind::BrokenPipe => {
                self.state = TransportState::Aborted;
                Ok(())
            }
            Err(error) => Err(self.absorb(error)),
        }
    }

    fn close_status(&self) -> Option<CloseStatus> {
        self.close_status
    }

    fn close_description(&self) -> Option<&str> {
        self.close_description.as_deref()
    }
}
