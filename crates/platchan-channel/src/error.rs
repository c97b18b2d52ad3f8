use platchan_codec::{CodecError, MethodError};
use platchan_transport::TransportError;

/// Errors surfaced by method channels and plugins.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The call or its reply could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport refused or failed the send.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The remote method handler answered with an error envelope.
    #[error("method failed: {0}")]
    Method(#[from] MethodError),

    /// A plugin failed during initialization.
    #[error("plugin {plugin} failed to initialize: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: Box<ChannelError>,
    },

    /// A plugin was used before `init_plugin` ran.
    #[error("plugin {plugin} is not initialized")]
    NotInitialized { plugin: String },
}

impl ChannelError {
    /// The typed remote error, if this is one.
    pub fn as_method_error(&self) -> Option<&MethodError> {
        match self {
            Self::Method(err) => Some(err),
            Self::Plugin { source, .. } => source.as_method_error(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
