//! Method channels and host plugins for platchan.
//!
//! A [`MethodChannel`] binds itself to one channel on a
//! [`BinaryMessenger`](platchan_transport::BinaryMessenger), decodes inbound
//! method calls with its codec, dispatches them by method name, and encodes
//! the reply envelope. The same channel invokes methods on the other side.
//!
//! Plugins group channels into units of host functionality and are
//! initialized through a [`PluginRegistry`].

pub mod error;
pub mod handler;
pub mod method_channel;
pub mod platform;
pub mod plugin;
pub mod textinput;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ChannelError, Result};
pub use handler::{decode_arguments, MethodHandler, INVALID_ARGUMENTS};
pub use method_channel::{MethodChannel, ENCODE_FAILED, MALFORMED_CALL, OVERLOADED};
pub use platform::{PlatformPlugin, PLATFORM_CHANNEL};
pub use plugin::{HeadlessSurface, HostSurface, Plugin, PluginEntry, PluginRegistry, SurfacePlugin};
pub use textinput::{EditingState, TextInputPlugin, TextInputSession, TEXTINPUT_CHANNEL};
