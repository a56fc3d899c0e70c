//! Request dispatch: envelope codec, argument binding and routing.
//!
//! A reassembled message is decoded into a [`Request`], routed through the
//! endpoint registry by the [`Dispatcher`] and answered with exactly one
//! [`Response`], which the codec serialises for the transport.

mod binder;
mod codec;
mod dispatcher;
mod errors;
mod response;

pub use self::codec::{EnvelopeCodec, Request};
pub use self::dispatcher::{DispatchSettings, Dispatcher};
pub use self::errors::{CodecError, DispatchError};
pub use self::response::{Response, Status, timestamp_micros};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
