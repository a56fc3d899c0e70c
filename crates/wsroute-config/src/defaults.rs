use crate::policy::{FieldNaming, LogFormat};
use crate::socket::SocketEndpoint;

/// Default TCP port the daemon listens on.
pub const DEFAULT_TCP_PORT: u16 = 9780;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Largest reassembled request accepted by default (4 MiB).
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 4 * 1024 * 1024;

/// Size of a single transport read by default (4 KiB).
pub const DEFAULT_RECEIVE_BUFFER_BYTES: usize = 4 * 1024;

/// Slot name offered to components for the connection context.
pub const DEFAULT_CONTEXT_SLOT: &str = "WebSocketHttpContext";

/// Slot name offered to components for the transport handle.
pub const DEFAULT_TRANSPORT_SLOT: &str = "WebSocketClient";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

pub(crate) fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default listen endpoint: loopback TCP on [`DEFAULT_TCP_PORT`].
pub fn default_listen_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}

pub(crate) fn default_max_request_bytes() -> usize {
    DEFAULT_MAX_REQUEST_BYTES
}

pub(crate) fn default_receive_buffer_bytes() -> usize {
    DEFAULT_RECEIVE_BUFFER_BYTES
}

pub(crate) fn default_context_slot() -> String {
    DEFAULT_CONTEXT_SLOT.to_owned()
}

pub(crate) fn default_transport_slot() -> String {
    DEFAULT_TRANSPORT_SLOT.to_owned()
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_response_naming() -> FieldNaming {
    FieldNaming::CamelCase
}
