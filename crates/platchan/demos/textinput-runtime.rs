//! Host and runtime in one process, joined by a socket pair.
//!
//! The runtime side opens a text-input connection and pushes an editing
//! state; the host side's text-input plugin stores it and echoes an update
//! back through `TextInputClient.updateEditingState`.
//!
//! Run with:
//!   cargo run --example textinput-runtime

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use platchan::channel::{MethodChannel, Plugin, TextInputPlugin, TextInputSession, TEXTINPUT_CHANNEL};
use platchan::codec::JsonMethodCodec;
use platchan::link::{IpcStream, LinkConfig, PendingLink};
use platchan::transport::{BinaryMessenger, FailurePolicy, Messenger, MessengerConfig};
use serde_json::{json, Value};

fn reporting(runtime: Arc<dyn platchan::transport::Runtime>) -> Result<Messenger, Box<dyn std::error::Error>> {
    let config = MessengerConfig::default().with_failure_policy(FailurePolicy::report(|failure| {
        eprintln!("channel failure: {failure}");
    }));
    Ok(Messenger::with_config(runtime, config)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host_end, runtime_end) = IpcStream::pair()?;
    let config = LinkConfig::default();

    let host_config = config.clone();
    let host = thread::spawn(move || PendingLink::server(host_end, "host", &host_config));
    let runtime_link = PendingLink::client(runtime_end, "json", &config)?;
    let host_link = host.join().map_err(|_| "host thread panicked")??;

    // Host side: the text-input plugin over a messenger.
    let host_messenger = reporting(host_link.runtime())?;
    let host_shared: Arc<dyn BinaryMessenger> = Arc::new(host_messenger.clone());
    let session = Arc::new(TextInputSession::new());
    let mut plugin = TextInputPlugin::new(Arc::clone(&session));
    plugin.init_plugin(&host_shared)?;
    let host_handle = host_link.start(Arc::new(host_messenger.clone()))?;

    // Runtime side: drives the text-input channel like a UI runtime would.
    let runtime_messenger = reporting(runtime_link.runtime())?;
    let runtime_shared: Arc<dyn BinaryMessenger> = Arc::new(runtime_messenger.clone());
    let runtime_channel = MethodChannel::new(runtime_shared, TEXTINPUT_CHANNEL, Arc::new(JsonMethodCodec));
    let (updates_tx, updates) = mpsc::channel::<Value>();
    let updates_tx = Mutex::new(updates_tx);
    runtime_channel.handle_func("TextInputClient.updateEditingState", move |args| {
        let _ = updates_tx.lock().map(|tx| tx.send(args));
        Ok(Value::Null)
    });
    let runtime_handle = runtime_link.start(Arc::new(runtime_messenger.clone()))?;

    runtime_channel.invoke_method("TextInput.setClient", json!([1, {"inputType": "text"}]))?;
    runtime_channel.invoke_method(
        "TextInput.setEditingState",
        json!({"text": "hello", "selectionBase": 5, "selectionExtent": 5}),
    )?;
    println!("host session: {:?}", session.editing_state());

    plugin.update_editing_state()?;
    let update = updates.recv_timeout(Duration::from_secs(2))?;
    println!("runtime received: {update}");

    runtime_handle.shutdown();
    host_handle.join();
    runtime_messenger.shutdown();
    host_messenger.shutdown();
    Ok(())
}
