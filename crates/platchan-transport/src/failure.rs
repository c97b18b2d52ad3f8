use std::fmt;
use std::sync::Arc;

use tracing::error;

/// A channel-level failure: routing or binary-handler breakage that the
/// method layer cannot express as an error envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFailure {
    /// A message arrived on a channel nobody registered.
    NoHandler { channel: String },
    /// The binary handler returned an error.
    HandlerFailed { channel: String, error: String },
    /// The binary handler panicked.
    HandlerPanicked { channel: String, panic: String },
}

impl ChannelFailure {
    pub fn channel(&self) -> &str {
        match self {
            Self::NoHandler { channel }
            | Self::HandlerFailed { channel, .. }
            | Self::HandlerPanicked { channel, .. } => channel,
        }
    }
}

impl fmt::Display for ChannelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHandler { channel } => write!(f, "no handler found for channel {channel}"),
            Self::HandlerFailed { channel, error } => {
                write!(f, "handling message on channel {channel} failed: {error}")
            }
            Self::HandlerPanicked { channel, panic } => {
                write!(f, "handler for channel {channel} panicked: {panic}")
            }
        }
    }
}

/// Observer invoked for channel-level failures under [`FailurePolicy::Report`].
pub type FailureObserver = Arc<dyn Fn(&ChannelFailure) + Send + Sync>;

/// What the messenger does when a channel-level failure happens.
#[derive(Clone, Default)]
pub enum FailurePolicy {
    /// Log the failure and terminate the process with status 1.
    #[default]
    Exit,
    /// Hand the failure to an observer and keep running. Messages that carry
    /// a reply token still get exactly one (empty) reply.
    Report(FailureObserver),
}

impl FailurePolicy {
    /// Report failures to `observer` instead of exiting.
    pub fn report(observer: impl Fn(&ChannelFailure) + Send + Sync + 'static) -> Self {
        Self::Report(Arc::new(observer))
    }

    /// Apply the policy. Returns only under `Report`.
    pub(crate) fn apply(&self, failure: &ChannelFailure) {
        error!(channel = failure.channel(), %failure, "channel failure");
        match self {
            Self::Exit => std::process::exit(1),
            Self::Report(observer) => observer(failure),
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Exit)
    }
}

impl fmt::Debug for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit => f.write_str("Exit"),
            Self::Report(_) => f.write_str("Report(<observer>)"),
        }
    }
}
