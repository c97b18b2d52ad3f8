use bytes::Bytes;

use crate::error::Result;
use crate::message::{InboundMessage, ReplyToken};

/// Outbound half of the embedding boundary.
///
/// Implemented by whatever actually hosts the UI runtime: an in-process
/// engine binding, a socket link to a remote runtime, or a test fake.
pub trait Runtime: Send + Sync {
    /// Hand `payload` to the runtime addressed to `channel`.
    ///
    /// Returns the runtime's reply when it produces one. `Ok(None)` means the
    /// send was accepted and no reply is available for it.
    fn send_platform_message(&self, channel: &str, payload: &[u8]) -> Result<Option<Bytes>>;

    /// Answer an inbound message. Consumes the token.
    fn send_platform_message_response(&self, token: ReplyToken, payload: &[u8]) -> Result<()>;
}

/// Inbound half of the embedding boundary.
///
/// The runtime side calls this from its own thread of control whenever a
/// message arrives.
pub trait InboundSink: Send + Sync {
    fn deliver_inbound(&self, message: InboundMessage);
}
