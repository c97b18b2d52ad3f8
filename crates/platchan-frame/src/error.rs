/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x5043 \"PC\")")]
    InvalidMagic,

    /// The frame header names a kind this version does not know.
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The channel name exceeds [`MAX_CHANNEL_NAME_LEN`](crate::MAX_CHANNEL_NAME_LEN).
    #[error("channel name too long ({len} bytes, max {max})")]
    ChannelTooLong { len: usize, max: usize },

    /// The channel name is not valid UTF-8.
    #[error("channel name is not valid UTF-8")]
    InvalidChannelName(#[from] std::str::Utf8Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
