//! Wire codecs for platform-channel method calls.
//!
//! A codec turns a [`MethodCall`] or a reply [`Envelope`] into bytes and
//! back. Two codecs ship here:
//! - [`JsonMethodCodec`]: `{"method", "args"}` calls and array envelopes
//! - [`BinaryMethodCodec`]: CBOR arrays with an integer envelope discriminator
//!
//! Both carry the same value model ([`serde_json::Value`]), so a channel can
//! switch codecs without touching its handlers.

pub mod binary;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod json;

pub use binary::BinaryMethodCodec;
pub use codec::{CodecKind, MethodCodec};
pub use envelope::{Envelope, MethodCall, MethodError};
pub use error::{CodecError, Result};
pub use json::JsonMethodCodec;
pub use serde_json::Value;
