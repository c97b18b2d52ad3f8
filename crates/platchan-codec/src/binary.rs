//! Compact binary method codec over CBOR.
//!
//! Calls and envelopes are definite-length CBOR arrays:
//! ```text
//! call:     [<method>, <args>]
//! success:  [0, <value>]
//! error:    [1, <code>, <message>, <details>]
//! ```
//!
//! The leading integer is the envelope discriminator, so a success value
//! shaped like an error (or the other way round) still decodes to the variant
//! it was encoded as. Values go through serde, so any [`serde_json::Value`]
//! round-trips.

use std::fmt;
use std::io;

use bytes::Bytes;
use ciborium::de::Error as DecodeError;
use serde::de::{self, Deserialize, Deserializer, Expected, IgnoredAny, SeqAccess, Visitor};
use serde_json::Value;

use crate::codec::MethodCodec;
use crate::envelope::{Envelope, MethodCall, MethodError};
use crate::error::{CodecError, Result};

/// Maximum array/map nesting accepted inside a call's arguments or an
/// envelope's value.
pub const MAX_DEPTH: usize = 128;

const ENVELOPE_SUCCESS: u8 = 0;
const ENVELOPE_ERROR: u8 = 1;

/// CBOR codec over the same value model as the JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryMethodCodec;

impl BinaryMethodCodec {
    pub const NAME: &'static str = "binary";
}

impl MethodCodec for BinaryMethodCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn encode_method_call(&self, call: &MethodCall) -> Result<Bytes> {
        encode(&(&call.method, &call.arguments))
    }

    fn decode_method_call(&self, payload: &[u8]) -> Result<MethodCall> {
        let WireCall(call) = decode(payload, CodecError::MalformedCall)?;
        if call.method.is_empty() {
            return Err(CodecError::MalformedCall("missing method name".to_string()));
        }
        Ok(call)
    }

    fn encode_success_envelope(&self, value: &Value) -> Result<Bytes> {
        encode(&(ENVELOPE_SUCCESS, value))
    }

    fn encode_error_envelope(&self, code: &str, message: &str, details: &Value) -> Result<Bytes> {
        encode(&(ENVELOPE_ERROR, code, message, details))
    }

    fn decode_envelope(&self, payload: &[u8]) -> Result<Envelope> {
        let WireEnvelope(envelope) = decode(payload, CodecError::MalformedEnvelope)?;
        Ok(envelope)
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)?;
    Ok(buf.into())
}

/// Decode exactly one item from `payload`. Shape errors reported by the wire
/// visitors are wrapped with `malformed`.
fn decode<T>(payload: &[u8], malformed: fn(String) -> CodecError) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let mut src = payload;
    // One extra level for the call/envelope array itself.
    let decoded: std::result::Result<T, DecodeError<io::Error>> =
        ciborium::de::from_reader_with_recursion_limit(&mut src, MAX_DEPTH + 1);
    let offset = payload.len() - src.len();
    let value = decoded.map_err(|err| match err {
        DecodeError::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
            CodecError::UnexpectedEof { offset }
        }
        DecodeError::RecursionLimitExceeded => CodecError::DepthLimit { limit: MAX_DEPTH },
        DecodeError::Semantic(_, message) => malformed(message),
        other => CodecError::CborDecode(other),
    })?;
    if !src.is_empty() {
        return Err(CodecError::TrailingBytes { count: src.len() });
    }
    Ok(value)
}

fn element<'de, T, A>(seq: &mut A, index: usize, expected: &dyn Expected) -> std::result::Result<T, A::Error>
where
    T: Deserialize<'de>,
    A: SeqAccess<'de>,
{
    seq.next_element()?
        .ok_or_else(|| de::Error::invalid_length(index, expected))
}

fn end<'de, A: SeqAccess<'de>>(
    mut seq: A,
    len: usize,
    expected: &dyn Expected,
) -> std::result::Result<(), A::Error> {
    if seq.next_element::<IgnoredAny>()?.is_some() {
        return Err(de::Error::invalid_length(len + 1, expected));
    }
    Ok(())
}

struct WireCall(MethodCall);

impl<'de> Deserialize<'de> for WireCall {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_seq(CallVisitor)
    }
}

struct CallVisitor;

impl<'de> Visitor<'de> for CallVisitor {
    type Value = WireCall;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a method call array [method, args]")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<WireCall, A::Error> {
        let method: String = element(&mut seq, 0, &self)?;
        let arguments: Value = element(&mut seq, 1, &self)?;
        end(seq, 2, &self)?;
        Ok(WireCall(MethodCall { method, arguments }))
    }
}

struct WireEnvelope(Envelope);

impl<'de> Deserialize<'de> for WireEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_seq(EnvelopeVisitor)
    }
}

struct EnvelopeVisitor;

impl<'de> Visitor<'de> for EnvelopeVisitor {
    type Value = WireEnvelope;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an envelope array [0, value] or [1, code, message, details]")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<WireEnvelope, A::Error> {
        let discriminator: u8 = element(&mut seq, 0, &self)?;
        let (envelope, len) = match discriminator {
            ENVELOPE_SUCCESS => (Envelope::Success(element(&mut seq, 1, &self)?), 2),
            ENVELOPE_ERROR => {
                let error = MethodError {
                    code: element(&mut seq, 1, &self)?,
                    message: element(&mut seq, 2, &self)?,
                    details: element(&mut seq, 3, &self)?,
                };
                (Envelope::Error(error), 4)
            }
            other => {
                return Err(de::Error::invalid_value(
                    de::Unexpected::Unsigned(other.into()),
                    &"envelope discriminator 0 or 1",
                ))
            }
        };
        end(seq, len, &self)?;
        Ok(WireEnvelope(envelope))
    }
}
