//! Error types for envelope decoding and endpoint dispatch.
//!
//! None of these reach the transport: decoding failures and dispatch
//! failures are both turned into status `1` responses.

use serde_json::Value;
use thiserror::Error;

use crate::endpoint::EndpointError;

/// Errors raised while decoding a request or encoding a response.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The message is not valid JSON.
    #[error("malformed request: {message}")]
    Malformed {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The JSON does not have the shape of a request envelope.
    #[error("invalid request structure: {message}")]
    InvalidStructure {
        message: String,
        /// Identifier salvaged from the envelope so the reply can echo it.
        id: Value,
    },

    /// A response envelope could not be serialised.
    #[error("failed to serialise response: {0}")]
    Encode(#[source] serde_json::Error),
}

impl CodecError {
    pub(crate) fn from_json_error(source: serde_json::Error) -> Self {
        Self::Malformed {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn invalid_structure(message: impl Into<String>, id: Value) -> Self {
        Self::InvalidStructure {
            message: message.into(),
            id,
        }
    }

    /// Request identifier recovered before the failure, or `null`.
    #[must_use]
    pub fn request_id(&self) -> Value {
        match self {
            Self::InvalidStructure { id, .. } => id.clone(),
            Self::Malformed { .. } | Self::Encode(_) => Value::Null,
        }
    }
}

/// Reasons a routed request failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The component factory failed.
    #[error("failed to construct {component}: {source}")]
    Construction {
        component: &'static str,
        #[source]
        source: EndpointError,
    },

    /// The endpoint method, or its deferred result, failed.
    #[error("{source}")]
    Invocation {
        #[source]
        source: EndpointError,
    },

    /// Endpoint code panicked.
    #[error("endpoint panicked: {message}")]
    Panicked { message: String },
}

impl DispatchError {
    pub(crate) fn construction(component: &'static str, source: EndpointError) -> Self {
        Self::Construction { component, source }
    }

    pub(crate) fn invocation(source: EndpointError) -> Self {
        Self::Invocation { source }
    }

    pub(crate) fn panicked(message: impl Into<String>) -> Self {
        Self::Panicked {
            message: message.into(),
        }
    }
}
