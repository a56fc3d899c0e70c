//! Shared configuration for the `wsroute` RPC daemon.
//!
//! [`Config`] is layered by `ortho_config`: built-in defaults, then an
//! optional configuration file (`--config-path` / `WSROUTE_CONFIG_PATH`),
//! then `WSROUTE_*` environment variables, then command-line flags.
//!
//! The values here cover the dispatch engine's tunables: message size limits,
//! the receive buffer, the serialization policy for request and response
//! envelopes, development-mode error detail, the slot names offered to
//! components for context injection, and the duplicate connection policy.

mod defaults;
mod policy;
mod socket;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CONTEXT_SLOT, DEFAULT_LOG_FILTER, DEFAULT_MAX_REQUEST_BYTES,
    DEFAULT_RECEIVE_BUFFER_BYTES, DEFAULT_TCP_PORT, DEFAULT_TRANSPORT_SLOT,
    default_listen_endpoint, default_log_filter, default_log_format,
};
pub use policy::{FieldNaming, LogFormat, PolicyParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Daemon configuration resolved from every configuration layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "WSROUTE")]
pub struct Config {
    /// Endpoint the WebSocket listener binds to.
    #[serde(default = "defaults::default_listen_endpoint")]
    pub listen: SocketEndpoint,
    /// Largest reassembled message accepted before it is discarded.
    #[serde(default = "defaults::default_max_request_bytes")]
    pub max_request_bytes: usize,
    /// Bytes pulled from the transport per read.
    #[serde(default = "defaults::default_receive_buffer_bytes")]
    pub receive_buffer_bytes: usize,
    /// Includes caller address, route and failure detail in `msg`.
    #[serde(default)]
    pub development: bool,
    /// Injection slot name for the connection context.
    #[serde(default = "defaults::default_context_slot")]
    pub context_slot: String,
    /// Injection slot name for the transport handle.
    #[serde(default = "defaults::default_transport_slot")]
    pub transport_slot: String,
    /// Serve a connection whose identifier is already registered.
    #[serde(default)]
    pub allow_duplicate_connections: bool,
    /// Match request envelope keys regardless of case.
    #[serde(default = "defaults::default_true")]
    pub request_case_insensitive: bool,
    /// Naming convention for response envelope fields.
    #[serde(default = "defaults::default_response_naming")]
    pub response_naming: FieldNaming,
    /// Drop null-valued fields from response envelopes.
    #[serde(default = "defaults::default_true")]
    pub response_omit_nulls: bool,
    /// Tracing filter expression.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: defaults::default_listen_endpoint(),
            max_request_bytes: defaults::default_max_request_bytes(),
            receive_buffer_bytes: defaults::default_receive_buffer_bytes(),
            development: false,
            context_slot: defaults::default_context_slot(),
            transport_slot: defaults::default_transport_slot(),
            allow_duplicate_connections: false,
            request_case_insensitive: true,
            response_naming: defaults::default_response_naming(),
            response_omit_nulls: true,
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
        }
    }
}

impl Config {
    /// Listen endpoint for the WebSocket listener.
    #[must_use]
    pub fn listen(&self) -> &SocketEndpoint {
        &self.listen
    }

    /// Maximum reassembled message size in bytes.
    #[must_use]
    pub fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    /// Transport read size in bytes; never zero.
    #[must_use]
    pub fn receive_buffer_bytes(&self) -> usize {
        self.receive_buffer_bytes.max(1)
    }

    /// Whether failure responses carry diagnostic detail.
    #[must_use]
    pub fn development(&self) -> bool {
        self.development
    }

    /// Slot name for connection context injection.
    #[must_use]
    pub fn context_slot(&self) -> &str {
        &self.context_slot
    }

    /// Slot name for transport handle injection.
    #[must_use]
    pub fn transport_slot(&self) -> &str {
        &self.transport_slot
    }

    /// Whether a duplicate connection identifier is still served.
    #[must_use]
    pub fn allow_duplicate_connections(&self) -> bool {
        self.allow_duplicate_connections
    }

    /// Whether request envelope keys match case-insensitively.
    #[must_use]
    pub fn request_case_insensitive(&self) -> bool {
        self.request_case_insensitive
    }

    /// Response field naming convention.
    #[must_use]
    pub fn response_naming(&self) -> FieldNaming {
        self.response_naming
    }

    /// Whether null response fields are dropped.
    #[must_use]
    pub fn response_omit_nulls(&self) -> bool {
        self.response_omit_nulls
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.listen(), &SocketEndpoint::tcp("127.0.0.1", 9780));
        assert_eq!(config.max_request_bytes(), 4 * 1024 * 1024);
        assert_eq!(config.receive_buffer_bytes(), 4 * 1024);
        assert!(!config.development());
        assert_eq!(config.context_slot(), "WebSocketHttpContext");
        assert_eq!(config.transport_slot(), "WebSocketClient");
        assert!(config.request_case_insensitive());
        assert_eq!(config.response_naming(), FieldNaming::CamelCase);
        assert!(config.response_omit_nulls());
        assert_eq!(config.log_format(), LogFormat::Json);
    }

    #[test]
    fn zero_receive_buffer_is_clamped() {
        let config = Config {
            receive_buffer_bytes: 0,
            ..Config::default()
        };
        assert_eq!(config.receive_buffer_bytes(), 1);
    }
}
