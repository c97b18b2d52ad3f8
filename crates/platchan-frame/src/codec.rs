use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: magic (2) + kind (1) + reserved (1) + token (8) +
/// channel length (2) + payload length (4) = 18 bytes.
pub const HEADER_SIZE: usize = 18;

/// Magic bytes: "PC" (0x50 0x43).
pub const MAGIC: [u8; 2] = [0x50, 0x43];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Longest channel name a frame may carry, in bytes.
pub const MAX_CHANNEL_NAME_LEN: usize = 256;

/// Token value meaning "no reply expected" on a message frame.
pub const NO_REPLY: u64 = 0;

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// A platform message addressed to a channel.
    Message = 1,
    /// The answer to a message, matched by token.
    Reply = 2,
    /// Link control traffic (handshake).
    Control = 3,
}

impl TryFrom<u8> for FrameKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Message),
            2 => Ok(Self::Reply),
            3 => Ok(Self::Control),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Reply correlation token. [`NO_REPLY`] on one-way messages and control frames.
    pub token: u64,
    /// Target channel. Empty on reply and control frames.
    pub channel: String,
    pub payload: Bytes,
}

impl Frame {
    /// A platform message. `token` is [`NO_REPLY`] when no answer is wanted.
    pub fn message(channel: impl Into<String>, token: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Message,
            token,
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    pub fn reply(token: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Reply,
            token,
            channel: String::new(),
            payload: payload.into(),
        }
    }

    pub fn control(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Control,
            token: NO_REPLY,
            channel: String::new(),
            payload: payload.into(),
        }
    }

    /// True for a message frame that carries a reply token.
    pub fn expects_reply(&self) -> bool {
        self.kind == FrameKind::Message && self.token != NO_REPLY
    }

    /// The total wire size of this frame (header + channel + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.channel.len() + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬──────┬──────────┬───────────┬──────────┬──────────┬─────────┬─────────┐
/// │ Magic (2B) │ Kind │ Reserved │ Token     │ Chan len │ Len      │ Channel │ Payload │
/// │ "PC"       │ (1B) │ (1B)     │ (8B LE)   │ (2B LE)  │ (4B LE)  │ (UTF-8) │         │
/// └────────────┴──────┴──────────┴───────────┴──────────┴──────────┴─────────┴─────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let channel = frame.channel.as_bytes();
    if channel.len() > MAX_CHANNEL_NAME_LEN {
        return Err(FrameError::ChannelTooLong {
            len: channel.len(),
            max: MAX_CHANNEL_NAME_LEN,
        });
    }
    if frame.payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: frame.payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(frame.wire_size());
    dst.put_slice(&MAGIC);
    dst.put_u8(frame.kind as u8);
    dst.put_u8(0);
    dst.put_u64_le(frame.token);
    dst.put_u16_le(channel.len() as u16);
    dst.put_u32_le(frame.payload.len() as u32);
    dst.put_slice(channel);
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = &src[..HEADER_SIZE];
    if header[..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }
    header.advance(2);
    let kind = FrameKind::try_from(header.get_u8())?;
    header.advance(1);
    let token = header.get_u64_le();
    let channel_len = header.get_u16_le() as usize;
    let payload_len = header.get_u32_le() as usize;

    if channel_len > MAX_CHANNEL_NAME_LEN {
        return Err(FrameError::ChannelTooLong {
            len: channel_len,
            max: MAX_CHANNEL_NAME_LEN,
        });
    }
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + channel_len + payload_len;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let channel_bytes = src.split_to(channel_len);
    let channel = std::str::from_utf8(&channel_bytes)?.to_string();
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        kind,
        token,
        channel,
        payload,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
