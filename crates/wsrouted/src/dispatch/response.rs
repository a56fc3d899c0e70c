//! Response envelope and the clock used to stamp it.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde_json::Value;

use super::Request;

/// Outcome class carried in every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The endpoint ran and produced `body`.
    Success,
    /// Decoding, binding or the endpoint itself failed.
    Failure,
    /// No endpoint is registered under the target.
    NotFound,
}

impl Status {
    /// Wire code: `0` success, `1` failure, `2` not found.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::NotFound => 2,
        }
    }
}

/// Reply to exactly one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Request `id`, echoed unchanged; `null` when the request had none.
    pub id: Value,
    /// Request target exactly as sent; absent when it could not be read.
    pub target: Option<String>,
    pub status: Status,
    /// Endpoint result; `null` unless the call succeeded.
    pub body: Value,
    /// Failure detail, populated in development mode.
    pub msg: Option<String>,
    /// Microseconds since the Unix epoch when the request was taken up.
    pub request_time: u64,
    /// Microseconds since the Unix epoch when the response was produced.
    pub complete_time: u64,
}

impl Response {
    pub(crate) fn success(request: &Request, body: Value, request_time: u64) -> Self {
        Self::finish(
            request.id.clone(),
            Some(request.target.clone()),
            Status::Success,
            body,
            None,
            request_time,
        )
    }

    pub(crate) fn not_found(request: &Request, msg: String, request_time: u64) -> Self {
        Self::finish(
            request.id.clone(),
            Some(request.target.clone()),
            Status::NotFound,
            Value::Null,
            Some(msg),
            request_time,
        )
    }

    pub(crate) fn failure(
        id: Value,
        target: Option<String>,
        msg: Option<String>,
        request_time: u64,
    ) -> Self {
        Self::finish(id, target, Status::Failure, Value::Null, msg, request_time)
    }

    fn finish(
        id: Value,
        target: Option<String>,
        status: Status,
        body: Value,
        msg: Option<String>,
        request_time: u64,
    ) -> Self {
        Self {
            id,
            target,
            status,
            body,
            msg,
            request_time,
            complete_time: timestamp_micros().max(request_time),
        }
    }
}

static CLOCK_ANCHOR: Lazy<(u64, Instant)> = Lazy::new(|| {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    (u64::try_from(wall).unwrap_or(u64::MAX), Instant::now())
});

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// Anchored once per process and advanced by the monotonic clock, so values
/// never go backwards.
#[must_use]
pub fn timestamp_micros() -> u64 {
    let (wall, anchor) = *CLOCK_ANCHOR;
    let elapsed = u64::try_from(anchor.elapsed().as_micros()).unwrap_or(u64::MAX);
    wall.saturating_add(elapsed)
}
