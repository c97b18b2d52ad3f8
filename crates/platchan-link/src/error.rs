use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while establishing or running a runtime link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Failed to bind to the specified path.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified path.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the link stream.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] platchan_frame::FrameError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// JSON serialization/deserialization error on control frames.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A handshake step did not complete in time.
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// The remote end went away.
    #[error("link disconnected: {0}")]
    Disconnected(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;
