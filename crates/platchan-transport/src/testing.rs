//! In-memory [`Runtime`] for tests.
//!
//! Records every outbound send and every reply so tests can assert on
//! exactly what crossed the boundary.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::Result;
use crate::message::ReplyToken;
use crate::runtime::Runtime;

type Responder = Box<dyn Fn(&str, &[u8]) -> Result<Option<Bytes>> + Send + Sync>;

/// A fake runtime that records traffic.
///
/// Outbound sends are answered by an optional responder; without one they
/// return `Ok(None)`.
#[derive(Default)]
pub struct RecordingRuntime {
    state: Mutex<Recorded>,
    changed: Condvar,
    responder: Option<Responder>,
}

#[derive(Default)]
struct Recorded {
    sent: Vec<(String, Bytes)>,
    replies: Vec<(u64, Bytes)>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer outbound sends with `responder`.
    pub fn with_responder(
        responder: impl Fn(&str, &[u8]) -> Result<Option<Bytes>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Every `(channel, payload)` sent so far.
    pub fn sent(&self) -> Vec<(String, Bytes)> {
        self.lock().sent.clone()
    }

    /// Every `(token, payload)` reply so far, in arrival order.
    pub fn replies(&self) -> Vec<(u64, Bytes)> {
        self.lock().replies.clone()
    }

    /// Wait until at least `count` replies arrived or `timeout` passed, then
    /// return whatever has arrived.
    pub fn wait_for_replies(&self, count: usize, timeout: Duration) -> Vec<(u64, Bytes)> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.replies.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            state = self
                .changed
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.replies.clone()
    }

    /// Wait until at least `count` sends arrived or `timeout` passed.
    pub fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<(String, Bytes)> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.sent.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            state = self
                .changed
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.sent.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Runtime for RecordingRuntime {
    fn send_platform_message(&self, channel: &str, payload: &[u8]) -> Result<Option<Bytes>> {
        self.lock()
            .sent
            .push((channel.to_string(), Bytes::copy_from_slice(payload)));
        self.changed.notify_all();
        match &self.responder {
            Some(responder) => responder(channel, payload),
            None => Ok(None),
        }
    }

    fn send_platform_message_response(&self, token: ReplyToken, payload: &[u8]) -> Result<()> {
        self.lock()
            .replies
            .push((token.raw(), Bytes::copy_from_slice(payload)));
        self.changed.notify_all();
        Ok(())
    }
}
