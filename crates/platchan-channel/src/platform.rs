use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use platchan_codec::{JsonMethodCodec, MethodError};
use platchan_transport::BinaryMessenger;

use crate::error::{ChannelError, Result};
use crate::handler::decode_arguments;
use crate::method_channel::MethodChannel;
use crate::plugin::{HostSurface, Plugin, SurfacePlugin};

pub const PLATFORM_CHANNEL: &str = "flutter/platform";

/// The only clipboard format supported.
pub const TEXT_PLAIN: &str = "text/plain";

/// Error code for a clipboard request in any other format.
pub const UNSUPPORTED_MIME: &str = "unsupported_mime";

/// Error code when the host clipboard has no text.
pub const CLIPBOARD_EMPTY: &str = "clipboard_empty";

/// Serves clipboard and window-title requests on `flutter/platform`.
#[derive(Default)]
pub struct PlatformPlugin {
    messenger: Option<Arc<dyn BinaryMessenger>>,
    channel: Option<MethodChannel>,
}

#[derive(Deserialize)]
struct ClipboardData {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSwitcherDescription {
    label: String,
    #[serde(default)]
    primary_color: i64,
}

impl PlatformPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bound channel, once the surface is initialized.
    pub fn channel(&self) -> Option<&MethodChannel> {
        self.channel.as_ref()
    }
}

impl Plugin for PlatformPlugin {
    fn name(&self) -> &'static str {
        "platform"
    }

    fn init_plugin(&mut self, messenger: &Arc<dyn BinaryMessenger>) -> Result<()> {
        self.messenger = Some(Arc::clone(messenger));
        Ok(())
    }
}

impl SurfacePlugin for PlatformPlugin {
    fn init_surface(&mut self, surface: &Arc<dyn HostSurface>) -> Result<()> {
        let messenger = self
            .messenger
            .clone()
            .ok_or_else(|| ChannelError::NotInitialized {
                plugin: self.name().to_string(),
            })?;
        let channel = MethodChannel::new(messenger, PLATFORM_CHANNEL, Arc::new(JsonMethodCodec));

        let host = Arc::clone(surface);
        channel.handle_func("Clipboard.setData", move |args| {
            let data: ClipboardData = decode_arguments("Clipboard.setData", args)?;
            host.set_clipboard_text(&data.text);
            Ok(Value::Null)
        });

        let host = Arc::clone(surface);
        channel.handle_func("Clipboard.getData", move |args| {
            let mime: String = decode_arguments("Clipboard.getData", args)?;
            if mime != TEXT_PLAIN {
                return Err(MethodError::new(
                    UNSUPPORTED_MIME,
                    format!("obtaining mime type {mime} from the clipboard is not supported"),
                ));
            }
            let text = host
                .clipboard_text()
                .ok_or_else(|| MethodError::new(CLIPBOARD_EMPTY, "clipboard holds no text"))?;
            Ok(json!({ "text": text }))
        });

        let host = Arc::clone(surface);
        channel.handle_func("SystemChrome.setApplicationSwitcherDescription", move |args| {
            let description: AppSwitcherDescription =
                decode_arguments("SystemChrome.setApplicationSwitcherDescription", args)?;
            debug!(label = %description.label, primary_color = description.primary_color, "setting window title");
            host.set_title(&description.label);
            Ok(Value::Null)
        });

        self.channel = Some(channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::INVALID_ARGUMENTS;
    use crate::plugin::{HeadlessSurface, PluginRegistry};
    use crate::testing::LoopbackMessenger;

    fn setup() -> (MethodChannel, Arc<HeadlessSurface>) {
        let messenger: Arc<dyn BinaryMessenger> = Arc::new(LoopbackMessenger::new());
        let surface = Arc::new(HeadlessSurface::new());
        let host: Arc<dyn HostSurface> = surface.clone();

        let mut plugin = PlatformPlugin::new();
        plugin.init_plugin(&messenger).unwrap();
        plugin.init_surface(&host).unwrap();
        (plugin.channel().unwrap().clone(), surface)
    }

    #[test]
    fn test_clipboard_roundtrip() {
        let (channel, surface) = setup();
        channel
            .invoke_method("Clipboard.setData", json!({"text": "copied"}))
            .unwrap();
        assert_eq!(surface.clipboard_text().as_deref(), Some("copied"));

        let reply = channel
            .invoke_method("Clipboard.getData", json!("text/plain"))
            .unwrap();
        assert_eq!(reply, json!({"text": "copied"}));
    }

    #[test]
    fn test_clipboard_rejects_other_mime() {
        let (channel, _) = setup();
        let err = channel
            .invoke_method("Clipboard.getData", json!("image/png"))
            .unwrap_err();
        assert_eq!(err.as_method_error().unwrap().code, UNSUPPORTED_MIME);
    }

    #[test]
    fn test_empty_clipboard() {
        let (channel, _) = setup();
        let err = channel
            .invoke_method("Clipboard.getData", json!("text/plain"))
            .unwrap_err();
        assert_eq!(err.as_method_error().unwrap().code, CLIPBOARD_EMPTY);
    }

    #[test]
    fn test_switcher_description_sets_title() {
        let (channel, surface) = setup();
        channel
            .invoke_method(
                "SystemChrome.setApplicationSwitcherDescription",
                json!({"label": "Gallery", "primaryColor": 4280391411_i64}),
            )
            .unwrap();
        assert_eq!(surface.title(), "Gallery");

        let err = channel
            .invoke_method("SystemChrome.setApplicationSwitcherDescription", json!([]))
            .unwrap_err();
        assert_eq!(err.as_method_error().unwrap().code, INVALID_ARGUMENTS);
    }

    #[test]
    fn test_surface_before_plugin_init() {
        let host: Arc<dyn HostSurface> = Arc::new(HeadlessSurface::new());
        let mut plugin = PlatformPlugin::new();
        assert!(matches!(
            plugin.init_surface(&host),
            Err(ChannelError::NotInitialized { .. })
        ));
    }

    #[test]
    fn test_registered_through_registry() {
        let loopback = Arc::new(LoopbackMessenger::new());
        let messenger: Arc<dyn BinaryMessenger> = loopback.clone();
        let host: Arc<dyn HostSurface> = Arc::new(HeadlessSurface::new());

        let mut registry = PluginRegistry::new();
        registry.add_surface(PlatformPlugin::new());
        registry.init_all(&messenger, Some(&host)).unwrap();
        assert!(loopback.has_handler(PLATFORM_CHANNEL));
    }
}
