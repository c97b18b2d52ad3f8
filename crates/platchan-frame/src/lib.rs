//! Length-prefixed frames for carrying platform messages over a byte stream.
//!
//! Every frame is:
//! - a 2-byte magic number ("PC") for stream synchronization
//! - a kind byte: message, reply or control
//! - an 8-byte little-endian reply token
//! - 2-byte channel length and 4-byte payload length, little-endian
//! - the channel name and the payload
//!
//! Readers always hand back complete frames.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, FrameKind, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
    MAX_CHANNEL_NAME_LEN, NO_REPLY,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
