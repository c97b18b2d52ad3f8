use std::fmt;

use bytes::Bytes;

/// Opaque correlation handle for answering one inbound message.
///
/// Tokens are move-only: sending a reply consumes the token, so a message can
/// never be answered twice.
#[derive(PartialEq, Eq, Hash)]
pub struct ReplyToken(u64);

impl ReplyToken {
    /// Wrap a raw runtime handle.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw runtime handle.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ReplyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplyToken({:#x})", self.0)
    }
}

/// A message delivered by the runtime on a named channel.
#[derive(Debug)]
pub struct InboundMessage {
    /// Channel the message was addressed to.
    pub channel: String,
    /// Encoded payload; opaque at this layer.
    pub payload: Bytes,
    /// Present only when the sender expects a reply.
    pub reply_token: Option<ReplyToken>,
}

impl InboundMessage {
    /// A message that expects exactly one reply.
    pub fn new(channel: impl Into<String>, payload: impl Into<Bytes>, token: ReplyToken) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
            reply_token: Some(token),
        }
    }

    /// A fire-and-forget message; no reply is ever sent for it.
    pub fn one_way(channel: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
            reply_token: None,
        }
    }

    pub fn expects_reply(&self) -> bool {
        self.reply_token.is_some()
    }
}
