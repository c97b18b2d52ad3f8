//! Platform-channel messaging between a host application and an embedded UI
//! runtime.
//!
//! # Crate Structure
//!
//! - [`transport`]: Binary messenger, channel handler registry, runtime boundary
//! - [`codec`]: Method-call and result-envelope codecs (JSON, compact binary)
//! - [`channel`]: Method channels, plugin registry, platform and text-input plugins
//! - [`frame`]: Framing for platform messages and replies over a byte stream
//! - [`link`]: Unix-socket runtime link (behind `link` feature)

/// Re-export transport types.
pub mod transport {
    pub use platchan_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use platchan_codec::*;
}

/// Re-export channel and plugin types.
pub mod channel {
    pub use platchan_channel::*;
}

/// Re-export frame types.
pub mod frame {
    pub use platchan_frame::*;
}

/// Re-export runtime link types (requires `link` feature).
#[cfg(feature = "link")]
pub mod link {
    pub use platchan_link::*;
}
