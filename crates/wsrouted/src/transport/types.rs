//! Vocabulary shared by every transport implementation.

use std::fmt;

use crate::session::ConnectionContext;

use super::TransportError;

/// Lifecycle state reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    /// Handshake still in progress.
    Connecting,
    /// Messages flow in both directions.
    Open,
    /// A close frame was sent and the peer has not answered yet.
    CloseSent,
    /// The peer sent a close frame.
    CloseReceived,
    /// The closing handshake finished.
    Closed,
    /// The connection failed without a closing handshake.
    Aborted,
}

impl TransportState {
    /// Whether a read may be issued in this state.
    #[must_use]
    pub const fn is_receivable(self) -> bool {
        matches!(self, Self::Open | Self::CloseSent)
    }

    /// Whether the connection is finished and no further reads can succeed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::CloseReceived | Self::Closed | Self::Aborted)
    }
}

/// Payload type of a message; responses reuse the request's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// UTF-8 text message.
    Text,
    /// Binary message.
    Binary,
}

/// Close status code carried by a close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseStatus(u16);

impl CloseStatus {
    /// RFC 6455 status `1000`; the other constants follow the same registry.
    pub const NORMAL_CLOSURE: Self = Self(1000);
    pub const ENDPOINT_UNAVAILABLE: Self = Self(1001);
    pub const PROTOCOL_ERROR: Self = Self(1002);
    pub const INVALID_MESSAGE_TYPE: Self = Self(1003);
    pub const EMPTY: Self = Self(1005);
    pub const INVALID_PAYLOAD_DATA: Self = Self(1007);
    pub const POLICY_VIOLATION: Self = Self(1008);
    pub const MESSAGE_TOO_BIG: Self = Self(1009);
    pub const MANDATORY_EXTENSION: Self = Self(1010);
    pub const INTERNAL_SERVER_ERROR: Self = Self(1011);

    /// Wraps a raw status code.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        Self(code)
    }

    /// Raw status code.
    #[must_use]
    pub const fn code(self) -> u16 {
        self.0
    }

    /// Human-readable explanation used in disconnect logs.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self.0 {
            1000 => "normal closure",
            1001 => "endpoint unavailable",
            1002 => "protocol error",
            1003 => "invalid message type",
            1005 => "no status received",
            1007 => "invalid payload data",
            1008 => "policy violation",
            1009 => "message too big",
            1010 => "mandatory extension missing",
            1011 => "internal server error",
            _ => "unrecognised close status",
        }
    }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} ({})", self.0, self.describe())
    }
}

/// Outcome of a single transport read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// `count` bytes of a message fragment were written into the buffer.
    Data {
        kind: MessageKind,
        count: usize,
        end_of_message: bool,
    },
    /// A whole message over the transport's size cap was read and dropped.
    Oversized { size: usize },
    /// The peer initiated the closing handshake.
    Close {
        status: Option<CloseStatus>,
        description: String,
    },
}

/// A message-oriented, fragment-capable, full-duplex connection.
pub trait Transport: Send {
    /// Current lifecycle state.
    fn state(&self) -> TransportState;

    /// Reads the next fragment into `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the stream fails or is already closed.
    fn receive(&mut self, buffer: &mut [u8]) -> Result<Received, TransportError>;

    /// Sends `payload` as a message (or final fragment when `end_of_message`).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the stream fails or is already closed.
    fn send(
        &mut self,
        kind: MessageKind,
        payload: &[u8],
        end_of_message: bool,
    ) -> Result<(), TransportError>;

    /// Starts the closing handshake.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the close frame cannot be written.
    fn close(&mut self, status: CloseStatus, description: &str) -> Result<(), TransportError>;

    /// Status received from the peer, if any.
    fn close_status(&self) -> Option<CloseStatus>;

    /// Description received from the peer, if any.
    fn close_description(&self) -> Option<&str>;
}

/// Performs the opening handshake for one accepted connection.
///
/// `admit` is consulted once the request path is known; returning `false`
/// rejects the connection and yields `Ok(None)`.
pub trait Acceptor {
    type Transport: Transport;

    /// Completes the handshake, filling in `context` from the request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the handshake fails for reasons other
    /// than a rejection by `admit`.
    fn accept(
        self,
        context: &mut ConnectionContext,
        admit: &mut dyn FnMut(&ConnectionContext) -> bool,
    ) -> Result<Option<Self::Transport>, TransportError>;
}
