//! Text-input session and the `flutter/textinput` plugin.
//!
//! The session is an owned object shared by `Arc` between the plugin's method
//! handlers and whatever host code edits text. It only stores state; cursor
//! and selection movement live in the host.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use platchan_codec::{JsonMethodCodec, MethodError};
use platchan_transport::BinaryMessenger;

use crate::error::{ChannelError, Result};
use crate::handler::{decode_arguments, INVALID_ARGUMENTS};
use crate::method_channel::MethodChannel;
use crate::plugin::Plugin;

pub const TEXTINPUT_CHANNEL: &str = "flutter/textinput";

const SELECTION_AFFINITY: &str = "TextAffinity.downstream";

/// Text and selection of the active input client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditingState {
    pub text: String,
    #[serde(default)]
    pub selection_base: i64,
    #[serde(default)]
    pub selection_extent: i64,
}

#[derive(Debug, Default)]
struct SessionState {
    client_id: Option<i64>,
    editing: EditingState,
}

/// State of the text-input connection with the runtime.
#[derive(Debug, Default)]
pub struct TextInputSession {
    state: Mutex<SessionState>,
}

impl TextInputSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The active client, if any.
    pub fn client_id(&self) -> Option<i64> {
        self.lock().client_id
    }

    pub fn set_client(&self, client_id: i64) {
        self.lock().client_id = Some(client_id);
    }

    /// Drop the active client. The editing state is kept.
    pub fn clear_client(&self) {
        self.lock().client_id = None;
    }

    /// Replace the editing state. Ignored (returns false) without a client.
    pub fn set_editing_state(&self, editing: EditingState) -> bool {
        let mut state = self.lock();
        if state.client_id.is_none() {
            return false;
        }
        state.editing = editing;
        true
    }

    pub fn editing_state(&self) -> EditingState {
        self.lock().editing.clone()
    }

    /// Client id and editing state read under one lock.
    fn snapshot(&self) -> (Option<i64>, EditingState) {
        let state = self.lock();
        (state.client_id, state.editing.clone())
    }
}

/// Serves `flutter/textinput` and pushes editing updates back to the runtime.
///
/// Cheap to clone; clones share the session and, once initialized, the
/// channel. Keep a clone to call [`update_editing_state`] and
/// [`perform_action`] after handing the plugin to a registry.
///
/// [`update_editing_state`]: Self::update_editing_state
/// [`perform_action`]: Self::perform_action
#[derive(Clone)]
pub struct TextInputPlugin {
    session: Arc<TextInputSession>,
    channel: Arc<OnceLock<MethodChannel>>,
}

impl TextInputPlugin {
    pub fn new(session: Arc<TextInputSession>) -> Self {
        Self {
            session,
            channel: Arc::new(OnceLock::new()),
        }
    }

    pub fn session(&self) -> &Arc<TextInputSession> {
        &self.session
    }

    pub fn channel(&self) -> Option<&MethodChannel> {
        self.channel.get()
    }

    fn bound_channel(&self) -> Result<&MethodChannel> {
        self.channel.get().ok_or_else(|| ChannelError::NotInitialized {
            plugin: self.name().to_string(),
        })
    }

    /// Send the current editing state to the runtime
    /// (`TextInputClient.updateEditingState`). Does nothing without a client.
    pub fn update_editing_state(&self) -> Result<()> {
        let channel = self.bound_channel()?;
        let (Some(client_id), editing) = self.session.snapshot() else {
            return Ok(());
        };
        let arguments = json!([
            client_id,
            {
                "text": editing.text,
                "selectionBase": editing.selection_base,
                "selectionExtent": editing.selection_extent,
                "selectionAffinity": SELECTION_AFFINITY,
                "selectionIsDirectional": false,
            }
        ]);
        channel.invoke_method("TextInputClient.updateEditingState", arguments)?;
        Ok(())
    }

    /// Tell the runtime the user triggered `action` (e.g. `done`, `newline`)
    /// through `TextInputClient.performAction`. Does nothing without a client.
    pub fn perform_action(&self, action: &str) -> Result<()> {
        let channel = self.bound_channel()?;
        let Some(client_id) = self.session.client_id() else {
            return Ok(());
        };
        let arguments = json!([client_id, format!("TextInputAction.{action}")]);
        channel.invoke_method("TextInputClient.performAction", arguments)?;
        Ok(())
    }
}

impl Plugin for TextInputPlugin {
    fn name(&self) -> &'static str {
        "textinput"
    }

    fn init_plugin(&mut self, messenger: &Arc<dyn BinaryMessenger>) -> Result<()> {
        let channel = MethodChannel::new(
            Arc::clone(messenger),
            TEXTINPUT_CHANNEL,
            Arc::new(JsonMethodCodec),
        );

        let session = Arc::clone(&self.session);
        channel.handle_func("TextInput.setClient", move |args| {
            let client_id = args
                .get(0)
                .and_then(Value::as_i64)
                .ok_or_else(|| {
                    MethodError::new(
                        INVALID_ARGUMENTS,
                        "TextInput.setClient expects [clientId, configuration]",
                    )
                })?;
            debug!(client_id, "text input client set");
            session.set_client(client_id);
            Ok(Value::Null)
        });

        let session = Arc::clone(&self.session);
        channel.handle_func("TextInput.clearClient", move |_| {
            session.clear_client();
            Ok(Value::Null)
        });

        let session = Arc::clone(&self.session);
        channel.handle_func("TextInput.setEditingState", move |args| {
            if session.client_id().is_none() {
                return Ok(Value::Null);
            }
            let editing: EditingState = decode_arguments("TextInput.setEditingState", args)?;
            session.set_editing_state(editing);
            Ok(Value::Null)
        });

        if self.channel.set(channel).is_err() {
            debug!("text input plugin already initialized; keeping the first channel");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use platchan_codec::{MethodCall, MethodCodec};
    use platchan_transport::{ChannelHandler, HandlerError};

    use super::*;
    use crate::testing::LoopbackMessenger;

    type Calls = Arc<Mutex<Vec<MethodCall>>>;

    fn setup() -> (TextInputPlugin, MethodChannel, Calls, Arc<LoopbackMessenger>) {
        let loopback = Arc::new(LoopbackMessenger::new());
        let messenger: Arc<dyn BinaryMessenger> = loopback.clone();
        let session = Arc::new(TextInputSession::new());
        let mut plugin = TextInputPlugin::new(session);
        plugin.init_plugin(&messenger).unwrap();

        let driver = plugin.channel().unwrap().clone();
        (plugin, driver, Arc::new(Mutex::new(Vec::new())), loopback)
    }

    /// Replace the plugin's binding with a recorder so outbound invocations
    /// land in `calls`.
    fn record_outbound(loopback: &LoopbackMessenger, calls: &Calls) {
        let calls = Arc::clone(calls);
        let recorder: Arc<dyn ChannelHandler> = Arc::new(
            move |payload: &[u8]| -> std::result::Result<Option<Bytes>, HandlerError> {
                let call = JsonMethodCodec
                    .decode_method_call(payload)
                    .map_err(|err| HandlerError::wrap("bad call", err))?;
                calls.lock().unwrap().push(call);
                Ok(None)
            },
        );
        loopback.set_channel_handler(TEXTINPUT_CHANNEL, Some(recorder));
    }

    #[test]
    fn test_client_lifecycle() {
        let (plugin, driver, _, _) = setup();
        let session = plugin.session();

        driver
            .invoke_method("TextInput.setClient", json!([3, {"inputType": "text"}]))
            .unwrap();
        assert_eq!(session.client_id(), Some(3));

        driver
            .invoke_method(
                "TextInput.setEditingState",
                json!({"text": "hello", "selectionBase": 5, "selectionExtent": 5}),
            )
            .unwrap();
        assert_eq!(
            session.editing_state(),
            EditingState {
                text: "hello".to_string(),
                selection_base: 5,
                selection_extent: 5,
            }
        );

        driver.invoke_method("TextInput.clearClient", Value::Null).unwrap();
        assert_eq!(session.client_id(), None);
    }

    #[test]
    fn test_editing_state_ignored_without_client() {
        let (plugin, driver, _, _) = setup();
        driver
            .invoke_method("TextInput.setEditingState", json!({"text": "lost"}))
            .unwrap();
        assert_eq!(plugin.session().editing_state(), EditingState::default());
    }

    #[test]
    fn test_set_client_rejects_bad_arguments() {
        let (_, driver, _, _) = setup();
        let err = driver
            .invoke_method("TextInput.setClient", json!({"id": 1}))
            .unwrap_err();
        assert_eq!(err.as_method_error().unwrap().code, INVALID_ARGUMENTS);
    }

    #[test]
    fn test_outbound_updates() {
        let (plugin, _, calls, loopback) = setup();
        plugin.session().set_client(7);
        plugin.session().set_editing_state(EditingState {
            text: "ab".to_string(),
            selection_base: 1,
            selection_extent: 2,
        });
        record_outbound(&loopback, &calls);

        plugin.update_editing_state().unwrap();
        plugin.perform_action("done").unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method, "TextInputClient.updateEditingState");
        assert_eq!(calls[0].arguments[0], json!(7));
        assert_eq!(calls[0].arguments[1]["text"], "ab");
        assert_eq!(calls[0].arguments[1]["selectionAffinity"], SELECTION_AFFINITY);
        assert_eq!(
            calls[1],
            MethodCall::new("TextInputClient.performAction", json!([7, "TextInputAction.done"]))
        );
    }

    #[test]
    fn test_outbound_skipped_without_client() {
        let (plugin, _, calls, loopback) = setup();
        record_outbound(&loopback, &calls);
        plugin.update_editing_state().unwrap();
        plugin.perform_action("newline").unwrap();
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_uninitialized_plugin() {
        let plugin = TextInputPlugin::new(Arc::new(TextInputSession::new()));
        assert!(matches!(
            plugin.perform_action("done"),
            Err(ChannelError::NotInitialized { .. })
        ));
    }
}
