//! Socket listener and the message-oriented transport seam.
//!
//! The listener binds the configured endpoint and hands each accepted stream
//! to a [`ConnectionHandler`] on its own thread. Sessions never touch the raw
//! stream: they drive a [`Transport`], which exposes the connection as a
//! sequence of typed message fragments, and obtain it from an [`Acceptor`]
//! that performs the opening handshake.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod scripted;
mod types;
mod websocket;

pub use self::errors::{ListenerError, TransportError};
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream};
pub use self::listener::ListenerHandle;
pub(crate) use self::listener::SocketListener;
#[cfg(test)]
pub(crate) use self::scripted::{ScriptedAcceptor, ScriptedTransport, TransportLog};
pub use self::types::{Acceptor, CloseStatus, MessageKind, Received, Transport, TransportState};
pub(crate) use self::websocket::WebSocketAcceptor;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
