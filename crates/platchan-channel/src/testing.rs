//! In-process [`BinaryMessenger`] for tests.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;

use platchan_transport::{BinaryMessenger, ChannelHandler, TransportError};

/// Routes every send straight to the handler bound on the same channel,
/// synchronously, and returns that handler's reply.
///
/// Sends on a channel with no handler return `Ok(None)`. A handler error
/// surfaces as [`TransportError::Rejected`].
#[derive(Default)]
pub struct LoopbackMessenger {
    handlers: RwLock<HashMap<String, Arc<dyn ChannelHandler>>>,
}

impl LoopbackMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_handler(&self, channel: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(channel)
    }
}

impl BinaryMessenger for LoopbackMessenger {
    fn send(&self, channel: &str, payload: &[u8]) -> platchan_transport::Result<Option<Bytes>> {
        if channel.is_empty() {
            return Err(TransportError::InvalidChannel(channel.to_string()));
        }
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned();
        let Some(handler) = handler else {
            return Ok(None);
        };
        handler
            .handle_message(payload)
            .map_err(|err| TransportError::Rejected {
                channel: channel.to_string(),
                reason: err.to_string(),
            })
    }

    fn set_channel_handler(&self, channel: &str, handler: Option<Arc<dyn ChannelHandler>>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        match handler {
            Some(handler) => handlers.insert(channel.to_string(), handler),
            None => handlers.remove(channel),
        };
    }
}
