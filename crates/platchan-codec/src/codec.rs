use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::binary::BinaryMethodCodec;
use crate::envelope::{Envelope, MethodCall, MethodError};
use crate::error::Result;
use crate::json::JsonMethodCodec;

/// Encodes and decodes method calls and reply envelopes.
///
/// Implementations are stateless: every operation is a pure function of its
/// input, and encoding the same value twice yields the same bytes. The layers
/// above only ever see this trait, so codecs can be swapped per channel.
pub trait MethodCodec: Send + Sync {
    /// Short identifier, used in logs and link handshakes.
    fn name(&self) -> &'static str;

    fn encode_method_call(&self, call: &MethodCall) -> Result<Bytes>;

    /// Fails if the payload is malformed or has no method name.
    fn decode_method_call(&self, payload: &[u8]) -> Result<MethodCall>;

    fn encode_success_envelope(&self, value: &Value) -> Result<Bytes>;

    fn encode_error_envelope(&self, code: &str, message: &str, details: &Value) -> Result<Bytes>;

    /// Decode a reply. An error envelope decodes to [`Envelope::Error`], never
    /// to a success value, whatever the shape of its fields.
    fn decode_envelope(&self, payload: &[u8]) -> Result<Envelope>;

    fn encode_envelope(&self, envelope: &Envelope) -> Result<Bytes> {
        match envelope {
            Envelope::Success(value) => self.encode_success_envelope(value),
            Envelope::Error(MethodError {
                code,
                message,
                details,
            }) => self.encode_error_envelope(code, message, details),
        }
    }
}

/// The codecs shipped with platchan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodecKind {
    #[default]
    Json,
    Binary,
}

impl CodecKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => JsonMethodCodec::NAME,
            Self::Binary => BinaryMethodCodec::NAME,
        }
    }

    /// A shared instance of this codec.
    pub fn codec(self) -> Arc<dyn MethodCodec> {
        match self {
            Self::Json => Arc::new(JsonMethodCodec),
            Self::Binary => Arc::new(BinaryMethodCodec),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "binary" | "bin" => Ok(Self::Binary),
            other => Err(format!("unknown codec {other:?} (expected json or binary)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    const KINDS: [CodecKind; 2] = [CodecKind::Json, CodecKind::Binary];

    /// Arbitrary values in the shared value model. Floats are quarter steps
    /// so their text form parses back to the same bits.
    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            any::<u64>().prop_map(Value::from),
            (-1_000_000i32..1_000_000).prop_map(|n| Value::from(f64::from(n) / 4.0)),
            ".{0,16}".prop_map(Value::from),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                prop::collection::btree_map("[a-zA-Z_]{0,8}", inner, 0..8)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn success_envelope_roundtrips(value in arb_value()) {
            for kind in KINDS {
                let codec = kind.codec();
                let bytes = codec.encode_success_envelope(&value).unwrap();
                prop_assert_eq!(codec.decode_envelope(&bytes).unwrap(), Envelope::Success(value.clone()));
            }
        }

        #[test]
        fn error_envelope_keeps_every_field(
            code in ".{0,12}",
            message in ".{0,24}",
            details in arb_value(),
        ) {
            for kind in KINDS {
                let codec = kind.codec();
                let bytes = codec.encode_error_envelope(&code, &message, &details).unwrap();
                let expected = MethodError {
                    code: code.clone(),
                    message: message.clone(),
                    details: details.clone(),
                };
                prop_assert_eq!(codec.decode_envelope(&bytes).unwrap(), Envelope::Error(expected));
            }
        }

        #[test]
        fn method_call_roundtrips(method in "[A-Za-z][A-Za-z0-9_.]{0,24}", arguments in arb_value()) {
            let call = MethodCall::new(method, arguments);
            for kind in KINDS {
                let codec = kind.codec();
                let bytes = codec.encode_method_call(&call).unwrap();
                prop_assert_eq!(codec.decode_method_call(&bytes).unwrap(), call.clone());
            }
        }
    }

    #[test]
    fn test_codec_kind_parse() {
        assert_eq!("JSON".parse::<CodecKind>(), Ok(CodecKind::Json));
        assert_eq!("bin".parse::<CodecKind>(), Ok(CodecKind::Binary));
        assert!("xml".parse::<CodecKind>().is_err());
        assert_eq!(CodecKind::Binary.to_string(), "binary");
    }

    #[test]
    fn test_encode_envelope_dispatches_on_variant() {
        for kind in [CodecKind::Json, CodecKind::Binary] {
            let codec = kind.codec();
            assert_eq!(codec.name(), kind.as_str());

            let err = Envelope::Error(MethodError::new("E1", "bad input"));
            let bytes = codec.encode_envelope(&err).unwrap();
            assert_eq!(codec.decode_envelope(&bytes).unwrap(), err);

            let ok = Envelope::Success(json!({"x": 1}));
            let bytes = codec.encode_envelope(&ok).unwrap();
            assert_eq!(codec.decode_envelope(&bytes).unwrap(), ok);
        }
    }
}
