use std::time::Duration;

/// Errors surfaced at the runtime boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The runtime is not accepting messages yet (or anymore).
    #[error("runtime not ready")]
    NotReady,

    /// The channel name cannot be addressed.
    #[error("invalid channel name {0:?}")]
    InvalidChannel(String),

    /// The runtime refused the message.
    #[error("runtime rejected message on {channel}: {reason}")]
    Rejected { channel: String, reason: String },

    /// The connection to the runtime went away while a reply was pending.
    #[error("runtime disconnected: {0}")]
    Disconnected(String),

    /// No reply arrived for an outbound message in time.
    #[error("no reply on {channel} after {timeout:?}")]
    ReplyTimeout { channel: String, timeout: Duration },

    /// An I/O error occurred while talking to the runtime.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The messenger has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Error returned by a raw binary channel handler.
///
/// Binary handler failures are channel-level failures and are routed through
/// the messenger's [`FailurePolicy`](crate::FailurePolicy).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error with context.
    pub fn wrap(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn handler_error_keeps_source() {
        let io = std::io::Error::other("disk gone");
        let err = HandlerError::wrap("clipboard read failed", io);
        assert_eq!(err.to_string(), "clipboard read failed");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("disk gone"));
    }

    #[test]
    fn reply_timeout_display_names_channel() {
        let err = TransportError::ReplyTimeout {
            channel: "flutter/textinput".to_string(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "no reply on flutter/textinput after 250ms");
    }
}
