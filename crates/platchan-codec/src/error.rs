/// Errors that can occur while encoding or decoding channel payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The JSON text could not be parsed or produced.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value could not be written as CBOR.
    #[error("CBOR encode error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),

    /// The CBOR input is not well formed.
    #[error("CBOR decode error: {0}")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),

    /// The payload is not a well-formed method call.
    #[error("malformed method call: {0}")]
    MalformedCall(String),

    /// The payload is not a well-formed success or error envelope.
    #[error("malformed reply envelope: {0}")]
    MalformedEnvelope(String),

    /// The payload ended in the middle of a value.
    #[error("unexpected end of payload at byte {offset}")]
    UnexpectedEof { offset: usize },

    /// Bytes were left over after the complete value.
    #[error("{count} trailing bytes after value")]
    TrailingBytes { count: usize },

    /// Arrays and maps are nested deeper than the codec allows.
    #[error("value nested deeper than {limit} levels")]
    DepthLimit { limit: usize },
}

pub type Result<T> = std::result::Result<T, CodecError>;
