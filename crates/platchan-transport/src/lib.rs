//! Binary message transport for platform channels.
//!
//! The lowest layer of platchan. A [`Messenger`] sits between the embedder
//! and the UI runtime:
//! - outbound, it forwards `(channel, payload)` to a [`Runtime`]
//! - inbound, it looks up the [`ChannelHandler`] bound to the channel and
//!   runs it on a bounded worker pool, answering the [`ReplyToken`] once
//!
//! Payloads are opaque bytes here; encoding lives in `platchan-codec`.

pub mod dispatch;
pub mod error;
pub mod failure;
pub mod message;
pub mod messenger;
pub mod registry;
pub mod runtime;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use dispatch::{DispatchConfig, DispatchStats, Overflow, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
pub use error::{HandlerError, Result, TransportError};
pub use failure::{ChannelFailure, FailureObserver, FailurePolicy};
pub use message::{InboundMessage, ReplyToken};
pub use messenger::{BinaryMessenger, Messenger, MessengerConfig};
pub use registry::{ChannelHandler, ChannelRegistry};
pub use runtime::{InboundSink, Runtime};
