use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::dispatch::{DispatchConfig, DispatchPool, DispatchStats, Keyed, SubmitError};
use crate::error::{Result, TransportError};
use crate::failure::{ChannelFailure, FailurePolicy};
use crate::message::{InboundMessage, ReplyToken};
use crate::registry::{ChannelHandler, ChannelRegistry};
use crate::runtime::{InboundSink, Runtime};

/// Capability the method layer depends on: send bytes on a channel and bind
/// a raw handler to a channel.
///
/// [`Messenger`] is the production implementation; anything else that
/// implements this can stand in for it.
pub trait BinaryMessenger: Send + Sync {
    /// Send `payload` on `channel`, returning the runtime's reply if any.
    fn send(&self, channel: &str, payload: &[u8]) -> Result<Option<Bytes>>;

    /// Install (or with `None`, remove) the handler for `channel`.
    ///
    /// Takes effect for the next delivered message; in-flight dispatches keep
    /// the handler they started with.
    fn set_channel_handler(&self, channel: &str, handler: Option<Arc<dyn ChannelHandler>>);
}

/// Configuration for a [`Messenger`].
#[derive(Debug, Clone, Default)]
pub struct MessengerConfig {
    pub dispatch: DispatchConfig,
    pub failure_policy: FailurePolicy,
}

impl MessengerConfig {
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// The binary message transport: owns the channel registry and dispatches
/// inbound runtime messages to channel handlers on a worker pool.
///
/// Cheap to clone; clones share the same registry and pool.
#[derive(Clone)]
pub struct Messenger {
    shared: Arc<Shared>,
}

struct Shared {
    channels: ChannelRegistry,
    context: Arc<DispatchContext>,
    pool: DispatchPool<Dispatch>,
    closed: AtomicBool,
}

/// State every dispatch needs after it leaves the boundary thread.
struct DispatchContext {
    runtime: Arc<dyn Runtime>,
    failure_policy: FailurePolicy,
    slow_handler_warning: Option<Duration>,
}

struct Dispatch {
    channel: String,
    payload: Bytes,
    reply_token: Option<ReplyToken>,
    handler: Arc<dyn ChannelHandler>,
    context: Arc<DispatchContext>,
}

impl Messenger {
    /// Create a messenger with default configuration.
    pub fn new(runtime: Arc<dyn Runtime>) -> Result<Self> {
        Self::with_config(runtime, MessengerConfig::default())
    }

    /// Create a messenger with explicit configuration.
    pub fn with_config(runtime: Arc<dyn Runtime>, config: MessengerConfig) -> Result<Self> {
        let context = Arc::new(DispatchContext {
            runtime,
            failure_policy: config.failure_policy,
            slow_handler_warning: config.dispatch.slow_handler_warning,
        });
        let pool = DispatchPool::start(&config.dispatch, Arc::new(Dispatch::execute))?;

        Ok(Self {
            shared: Arc::new(Shared {
                channels: ChannelRegistry::new(),
                context,
                pool,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Entry point for the runtime boundary. Never runs a handler inline.
    ///
    /// The handler is resolved here, at delivery time. A message on a
    /// channel with no handler is a channel-level failure and goes through
    /// the configured [`FailurePolicy`].
    pub fn deliver_inbound(&self, message: InboundMessage) {
        let InboundMessage {
            channel,
            payload,
            reply_token,
        } = message;
        let context = &self.shared.context;

        let Some(handler) = self.shared.channels.get(&channel) else {
            self.shared.pool.counters().record_failed();
            context
                .failure_policy
                .apply(&ChannelFailure::NoHandler { channel: channel.clone() });
            if let Some(token) = reply_token {
                context.reply(&channel, token, &[]);
            }
            return;
        };

        debug!(channel = %channel, size = payload.len(), expects_reply = reply_token.is_some(), "dispatching inbound message");
        let job = Dispatch {
            channel,
            payload,
            reply_token,
            handler,
            context: Arc::clone(context),
        };

        match self.shared.pool.submit(job) {
            Ok(()) => {}
            Err(SubmitError::Full(job)) => {
                warn!(channel = %job.channel, "dispatch queue full; rejecting message");
                job.reject();
            }
            Err(SubmitError::Closed(job)) => {
                warn!(channel = %job.channel, "messenger shut down; rejecting message");
                job.reject();
            }
        }
    }

    /// Names of channels that currently have a handler.
    pub fn channels(&self) -> Vec<String> {
        self.shared.channels.channels()
    }

    pub fn has_channel_handler(&self, channel: &str) -> bool {
        self.shared.channels.contains(channel)
    }

    /// Dispatch counters.
    pub fn stats(&self) -> DispatchStats {
        self.shared.pool.counters().snapshot()
    }

    /// Stop sending, drop every channel handler, drain queued dispatches
    /// and join the workers.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.channels.clear();
        self.shared.pool.close();
        debug!("messenger shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl BinaryMessenger for Messenger {
    fn send(&self, channel: &str, payload: &[u8]) -> Result<Option<Bytes>> {
        if self.is_shut_down() {
            return Err(TransportError::Shutdown);
        }
        validate_channel_name(channel)?;
        self.shared
            .context
            .runtime
            .send_platform_message(channel, payload)
    }

    fn set_channel_handler(&self, channel: &str, handler: Option<Arc<dyn ChannelHandler>>) {
        self.shared.channels.set(channel, handler);
    }
}

impl InboundSink for Messenger {
    fn deliver_inbound(&self, message: InboundMessage) {
        Messenger::deliver_inbound(self, message);
    }
}

impl DispatchContext {
    /// Issue the single reply for a message. Failures are logged, not retried.
    fn reply(&self, channel: &str, token: ReplyToken, payload: &[u8]) {
        if let Err(err) = self.runtime.send_platform_message_response(token, payload) {
            warn!(channel, error = %err, "failed sending response for message");
        }
    }
}

impl Dispatch {
    /// Run the handler and answer the token. Returns false on a channel-level failure.
    fn execute(self) -> bool {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.handler.handle_message(&self.payload)
        }));

        let elapsed = started.elapsed();
        if let Some(limit) = self.context.slow_handler_warning {
            if elapsed > limit {
                warn!(channel = %self.channel, ?elapsed, "slow channel handler");
            }
        }

        let (reply, failure) = match outcome {
            Ok(Ok(reply)) => (reply, None),
            Ok(Err(err)) => (
                None,
                Some(ChannelFailure::HandlerFailed {
                    channel: self.channel.clone(),
                    error: err.to_string(),
                }),
            ),
            Err(panic) => (
                None,
                Some(ChannelFailure::HandlerPanicked {
                    channel: self.channel.clone(),
                    panic: panic_message(panic.as_ref()),
                }),
            ),
        };

        if let Some(failure) = &failure {
            self.context.failure_policy.apply(failure);
        }

        if let Some(token) = self.reply_token {
            let payload = reply.as_deref().unwrap_or_default();
            self.context.reply(&self.channel, token, payload);
        }

        failure.is_none()
    }

    /// Answer a message that never reached its handler.
    fn reject(self) {
        if let Some(token) = self.reply_token {
            let reply = self.handler.overload_reply();
            self.context
                .reply(&self.channel, token, reply.as_deref().unwrap_or_default());
        }
    }
}

impl Keyed for Dispatch {
    fn key(&self) -> &str {
        &self.channel
    }
}

fn validate_channel_name(channel: &str) -> Result<()> {
    if channel.is_empty() || channel.contains('\0') {
        return Err(TransportError::InvalidChannel(channel.to_string()));
    }
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
