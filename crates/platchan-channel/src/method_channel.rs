use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use platchan_codec::{Envelope, MethodCall, MethodCodec, MethodError};
use platchan_transport::{BinaryMessenger, ChannelHandler, HandlerError};

use crate::error::{ChannelError, Result};
use crate::handler::MethodHandler;

/// Error code for an inbound payload that is not a valid method call.
pub const MALFORMED_CALL: &str = "malformed_call";

/// Error code for a handler result the codec could not encode.
pub const ENCODE_FAILED: &str = "encode_failed";

/// Error code for a call the messenger refused because its dispatch queue
/// was full.
pub const OVERLOADED: &str = "overloaded";

enum Registration {
    Active(Arc<dyn MethodHandler>),
    /// Registered without a handler: always answer with a null success.
    Acknowledge,
}

/// State shared with the installed [`Binding`]. Holds no messenger handle,
/// so the messenger's registry never keeps the messenger itself alive.
struct Inner {
    name: String,
    codec: Arc<dyn MethodCodec>,
    methods: RwLock<HashMap<String, Registration>>,
}

/// Method-call layer over one channel.
///
/// Creating a `MethodChannel` binds it as the channel's binary handler on the
/// messenger, replacing whatever was bound before. The binding stays until
/// the messenger drops its handlers (on shutdown) or another handler is set
/// for the same name.
#[derive(Clone)]
pub struct MethodChannel {
    inner: Arc<Inner>,
    messenger: Arc<dyn BinaryMessenger>,
}

impl MethodChannel {
    pub fn new(
        messenger: Arc<dyn BinaryMessenger>,
        name: impl Into<String>,
        codec: Arc<dyn MethodCodec>,
    ) -> Self {
        let inner = Arc::new(Inner {
            name: name.into(),
            codec,
            methods: RwLock::new(HashMap::new()),
        });
        let binding: Arc<dyn ChannelHandler> = Arc::new(Binding {
            inner: Arc::clone(&inner),
        });
        messenger.set_channel_handler(&inner.name, Some(binding));
        debug!(channel = %inner.name, codec = inner.codec.name(), "method channel bound");
        Self { inner, messenger }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn codec(&self) -> &Arc<dyn MethodCodec> {
        &self.inner.codec
    }

    /// Call `method` on the other side of the channel.
    ///
    /// Returns the success value, [`ChannelError::Method`] for an error
    /// envelope, or the codec/transport failure. An absent or empty reply is
    /// a null success.
    pub fn invoke_method(&self, method: &str, arguments: Value) -> Result<Value> {
        let payload = self
            .inner
            .codec
            .encode_method_call(&MethodCall::new(method, arguments))?;
        let reply = self.messenger.send(&self.inner.name, &payload)?;

        match reply {
            Some(reply) if !reply.is_empty() => self
                .inner
                .codec
                .decode_envelope(&reply)?
                .into_result()
                .map_err(ChannelError::Method),
            _ => Ok(Value::Null),
        }
    }

    /// Register `handler` for `method`, replacing any previous one.
    ///
    /// `None` does not unregister: the method is acknowledged with a null
    /// success without running anything. Use [`remove_handler`] to go back
    /// to "no handler".
    ///
    /// [`remove_handler`]: Self::remove_handler
    pub fn handle(&self, method: &str, handler: Option<Arc<dyn MethodHandler>>) {
        let registration = match handler {
            Some(handler) => Registration::Active(handler),
            None => Registration::Acknowledge,
        };
        self.inner
            .methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.to_string(), registration);
    }

    /// Register a closure for `method`.
    pub fn handle_func<F>(&self, method: &str, f: F)
    where
        F: Fn(Value) -> std::result::Result<Value, MethodError> + Send + Sync + 'static,
    {
        self.handle(method, Some(Arc::new(f)));
    }

    /// Forget `method` entirely. Returns true if it was registered.
    pub fn remove_handler(&self, method: &str) -> bool {
        self.inner
            .methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(method)
            .is_some()
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for MethodChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodChannel")
            .field("name", &self.inner.name)
            .field("codec", &self.inner.codec.name())
            .finish_non_exhaustive()
    }
}

/// The binary handler a [`MethodChannel`] installs on its messenger.
struct Binding {
    inner: Arc<Inner>,
}

impl ChannelHandler for Binding {
    fn handle_message(&self, payload: &[u8]) -> std::result::Result<Option<Bytes>, HandlerError> {
        self.inner.dispatch(payload)
    }

    fn overload_reply(&self) -> Option<Bytes> {
        self.inner
            .codec
            .encode_error_envelope(OVERLOADED, "channel dispatch queue is full", &Value::Null)
            .ok()
    }
}

enum Lookup {
    Missing,
    Acknowledge,
    Active(Arc<dyn MethodHandler>),
}

impl Inner {
    fn lookup(&self, method: &str) -> Lookup {
        let methods = self.methods.read().unwrap_or_else(PoisonError::into_inner);
        match methods.get(method) {
            None => Lookup::Missing,
            Some(Registration::Acknowledge) => Lookup::Acknowledge,
            Some(Registration::Active(handler)) => Lookup::Active(Arc::clone(handler)),
        }
    }

    fn dispatch(&self, payload: &[u8]) -> std::result::Result<Option<Bytes>, HandlerError> {
        let call = match self.codec.decode_method_call(payload) {
            Ok(call) => call,
            Err(err) => {
                warn!(channel = %self.name, error = %err, "failed to decode incoming method call");
                return self
                    .codec
                    .encode_error_envelope(MALFORMED_CALL, &err.to_string(), &Value::Null)
                    .map(Some)
                    .map_err(|encode_err| {
                        HandlerError::wrap("failed to encode decode-failure reply", encode_err)
                    });
            }
        };

        let envelope = match self.lookup(&call.method) {
            Lookup::Missing => {
                warn!(channel = %self.name, method = %call.method, "no method handler registered");
                return Ok(None);
            }
            Lookup::Acknowledge => Envelope::Success(Value::Null),
            Lookup::Active(handler) => match handler.handle_method(call.arguments) {
                Ok(value) => Envelope::Success(value),
                Err(err) => {
                    debug!(channel = %self.name, method = %call.method, code = %err.code, "method handler returned an error");
                    Envelope::Error(err)
                }
            },
        };

        match self.codec.encode_envelope(&envelope) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) => {
                warn!(channel = %self.name, method = %call.method, error = %err, "failed to encode reply");
                self.codec
                    .encode_error_envelope(ENCODE_FAILED, &err.to_string(), &Value::Null)
                    .map(Some)
                    .map_err(|_| HandlerError::wrap("failed to encode outgoing reply", err))
            }
        }
    }
}
