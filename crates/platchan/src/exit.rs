use std::fmt;
use std::io;

use platchan_channel::ChannelError;
use platchan_frame::FrameError;
use platchan_link::LinkError;
use platchan_transport::TransportError;

// Exit code constants aligned with rsfulmen/DDR-0002 semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::ChannelTooLong { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Bind { source, .. }
        | LinkError::Connect { source, .. }
        | LinkError::Accept(source)
        | LinkError::Io(source) => io_error(context, source),
        LinkError::Frame(err) => frame_error(context, err),
        LinkError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        LinkError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        LinkError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        LinkError::HandshakeFailed(_) | LinkError::Disconnected(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::ReplyTimeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::InvalidChannel(_) => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Disconnected(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Transport(err) => transport_error(context, err),
        ChannelError::Codec(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ChannelError::Method(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn reply_timeout_maps_to_timeout_code() {
        let err = channel_error(
            "invoke failed",
            ChannelError::Transport(TransportError::ReplyTimeout {
                channel: "platchan/echo".to_string(),
                timeout: Duration::from_secs(1),
            }),
        );
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("invoke failed: "));
    }

    #[test]
    fn missing_socket_is_transport_error() {
        let err = link_error(
            "connect failed",
            LinkError::Connect {
                path: "/tmp/none.sock".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn handshake_and_frame_errors() {
        assert_eq!(
            link_error("x", LinkError::HandshakeFailed("unsupported codec".into())).code,
            TRANSPORT_ERROR
        );
        assert_eq!(
            link_error("x", LinkError::Frame(FrameError::PayloadTooLarge { size: 9, max: 1 })).code,
            DATA_INVALID
        );
        assert_eq!(
            link_error("x", LinkError::Timeout(Duration::from_secs(5))).code,
            TIMEOUT
        );
    }
}
