//! Connection sessions and the registry of live connections.
//!
//! Each accepted connection is driven by a [`ConnectionSession`] on its own
//! thread. Sessions share a [`SessionRuntime`] (codec, dispatcher, hooks and
//! the [`SessionRegistry`]) and nothing else.

mod connection;
mod context;
mod handler;
mod hooks;
mod reassembler;
mod registry;
mod runtime;

pub use self::connection::{ConnectionSession, SessionReport, SessionState};
pub use self::context::{ConnectionContext, ConnectionId, SessionHandle};
pub(crate) use self::handler::RpcConnectionHandler;
pub(crate) use self::hooks::HookChain;
pub use self::hooks::{GlobalHooks, HookError, NoHooks, SessionHooks};
pub use self::reassembler::{MessageReassembler, Reassembled};
pub use self::registry::SessionRegistry;
pub use self::runtime::{ServerOptions, SessionRuntime};

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");
