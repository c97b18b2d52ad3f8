use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use tracing::debug;

use crate::error::HandlerError;

/// Raw payload handler bound to a channel.
///
/// Returning `Ok(None)` answers with an empty reply.
pub trait ChannelHandler: Send + Sync {
    fn handle_message(&self, payload: &[u8]) -> Result<Option<Bytes>, HandlerError>;

    /// Reply sent instead of running the handler when the dispatch queue
    /// refuses the message. `None` answers with an empty payload.
    fn overload_reply(&self) -> Option<Bytes> {
        None
    }
}

impl<F> ChannelHandler for F
where
    F: Fn(&[u8]) -> Result<Option<Bytes>, HandlerError> + Send + Sync,
{
    fn handle_message(&self, payload: &[u8]) -> Result<Option<Bytes>, HandlerError> {
        self(payload)
    }
}

/// Channel name → binary handler. At most one handler per channel.
///
/// Lookups take the read lock on every dispatch; registration takes the write
/// lock and is last-write-wins.
#[derive(Default)]
pub struct ChannelRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ChannelHandler>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `channel`, or remove the binding with `None`.
    ///
    /// Returns true when an existing handler was replaced or removed.
    pub fn set(&self, channel: &str, handler: Option<Arc<dyn ChannelHandler>>) -> bool {
        // A poisoned lock only means a writer panicked mid-insert; the map itself is intact.
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let previous = match handler {
            Some(handler) => handlers.insert(channel.to_string(), handler),
            None => handlers.remove(channel),
        };
        debug!(channel, replaced = previous.is_some(), "channel handler updated");
        previous.is_some()
    }

    /// Snapshot the handler for `channel`.
    pub fn get(&self, channel: &str) -> Option<Arc<dyn ChannelHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(channel)
    }

    /// Registered channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    pub fn clear(&self) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(reply: &'static [u8]) -> Arc<dyn ChannelHandler> {
        Arc::new(move |_: &[u8]| -> Result<Option<Bytes>, HandlerError> {
            Ok(Some(Bytes::from_static(reply)))
        })
    }

    #[test]
    fn second_registration_wins() {
        let registry = ChannelRegistry::new();
        assert!(!registry.set("flutter/platform", Some(constant(b"first"))));
        assert!(registry.set("flutter/platform", Some(constant(b"second"))));

        let handler = registry.get("flutter/platform").unwrap();
        let reply = handler.handle_message(b"").unwrap().unwrap();
        assert_eq!(reply.as_ref(), b"second");
        assert_eq!(registry.channels(), vec!["flutter/platform".to_string()]);
    }

    #[test]
    fn none_removes_binding() {
        let registry = ChannelRegistry::new();
        registry.set("a", Some(constant(b"x")));
        assert!(registry.set("a", None));
        assert!(!registry.contains("a"));
        assert!(!registry.set("a", None));
    }

    #[test]
    fn concurrent_registration_and_lookup() {
        let registry = Arc::new(ChannelRegistry::new());
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        registry.set(&format!("chan-{i}-{j}"), Some(constant(b"ok")));
                    }
                })
            })
            .collect();
        let reader = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let _ = registry.get("chan-0-0");
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(registry.channels().len(), 200);
    }
}
