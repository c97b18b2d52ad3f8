//! Framed Unix-socket link to a remote UI runtime.
//!
//! A [`RuntimeLink`] implements [`platchan_transport::Runtime`] over a socket:
//! outbound platform messages carry a token and wait for the matching reply
//! frame, and a reader thread hands inbound messages to an
//! [`platchan_transport::InboundSink`] (normally a `Messenger`).
//!
//! Either end can be the host. The side that binds runs the server half of
//! the handshake and assigns the link id.

pub mod error;
pub mod handshake;

#[cfg(unix)]
pub mod runtime_link;
#[cfg(unix)]
pub mod stream;

pub use error::{LinkError, Result};
pub use handshake::{
    handshake_client, handshake_server, HandshakeConfig, HandshakeRequest, HandshakeResponse,
    HandshakeResult, PROTOCOL_NAME, PROTOCOL_VERSION,
};

#[cfg(unix)]
pub use runtime_link::{
    connect, connect_with_config, LinkConfig, LinkHandle, LinkListener, PendingLink, RuntimeLink,
    DEFAULT_REPLY_TIMEOUT,
};
#[cfg(unix)]
pub use stream::{IpcStream, UnixDomainSocket};
