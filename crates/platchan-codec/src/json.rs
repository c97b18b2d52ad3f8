//! JSON method codec.
//!
//! Wire format:
//! ```text
//! call:     {"method": "<name>", "args": <value>}
//! success:  [<value>]
//! error:    ["<code>", "<message>", <details>]
//! ```
//!
//! Envelopes are always arrays and the array length is the discriminator, so
//! a success value that is itself a three-element array is still unambiguous.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::MethodCodec;
use crate::envelope::{Envelope, MethodCall, MethodError};
use crate::error::{CodecError, Result};

/// The reference text codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMethodCodec;

impl JsonMethodCodec {
    pub const NAME: &'static str = "json";
}

#[derive(Serialize)]
struct WireCallRef<'a> {
    method: &'a str,
    args: &'a Value,
}

#[derive(Deserialize)]
struct WireCall {
    method: Option<String>,
    #[serde(default)]
    args: Value,
}

impl MethodCodec for JsonMethodCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn encode_method_call(&self, call: &MethodCall) -> Result<Bytes> {
        let wire = WireCallRef {
            method: &call.method,
            args: &call.arguments,
        };
        Ok(serde_json::to_vec(&wire)?.into())
    }

    fn decode_method_call(&self, payload: &[u8]) -> Result<MethodCall> {
        let wire: WireCall = serde_json::from_slice(payload)?;
        match wire.method {
            Some(method) if !method.is_empty() => Ok(MethodCall {
                method,
                arguments: wire.args,
            }),
            _ => Err(CodecError::MalformedCall("missing method name".to_string())),
        }
    }

    fn encode_success_envelope(&self, value: &Value) -> Result<Bytes> {
        Ok(serde_json::to_vec(&[value])?.into())
    }

    fn encode_error_envelope(&self, code: &str, message: &str, details: &Value) -> Result<Bytes> {
        let envelope = (code, message, details);
        Ok(serde_json::to_vec(&envelope)?.into())
    }

    fn decode_envelope(&self, payload: &[u8]) -> Result<Envelope> {
        let value: Value = serde_json::from_slice(payload)?;
        let Value::Array(mut items) = value else {
            return Err(CodecError::MalformedEnvelope(
                "expected a JSON array".to_string(),
            ));
        };

        match items.len() {
            1 => Ok(Envelope::Success(items.remove(0))),
            3 => {
                let details = items.pop().unwrap_or(Value::Null);
                let message = match items.pop() {
                    Some(Value::String(message)) => message,
                    Some(Value::Null) | None => String::new(),
                    Some(other) => {
                        return Err(CodecError::MalformedEnvelope(format!(
                            "error message must be a string, got {other}"
                        )))
                    }
                };
                let code = match items.pop() {
                    Some(Value::String(code)) => code,
                    _ => {
                        return Err(CodecError::MalformedEnvelope(
                            "error code must be a string".to_string(),
                        ))
                    }
                };
                Ok(Envelope::Error(MethodError {
                    code,
                    message,
                    details,
                }))
            }
            n => Err(CodecError::MalformedEnvelope(format!(
                "expected 1 or 3 elements, got {n}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_method_call_wire_shape() {
        let codec = JsonMethodCodec;
        let bytes = codec
            .encode_method_call(&MethodCall::new("echo", json!({"x": 1})))
            .unwrap();
        assert_eq!(bytes.as_ref(), br#"{"method":"echo","args":{"x":1}}"#);

        let call = codec.decode_method_call(&bytes).unwrap();
        assert_eq!(call.method, "echo");
        assert_eq!(call.arguments, json!({"x": 1}));
    }

    #[test]
    fn test_decode_call_without_args() {
        let call = JsonMethodCodec
            .decode_method_call(br#"{"method":"TextInput.clearClient"}"#)
            .unwrap();
        assert_eq!(call.arguments, Value::Null);
    }

    #[test]
    fn test_decode_call_missing_method() {
        let err = JsonMethodCodec
            .decode_method_call(br#"{"args":[1,2]}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::MalformedCall(_)));

        let err = JsonMethodCodec.decode_method_call(b"not json").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn test_success_roundtrip() {
        let codec = JsonMethodCodec;
        for value in [
            Value::Null,
            json!(true),
            json!(-12),
            json!(1.5),
            json!("text"),
            json!({"nested": [1, {"a": null}]}),
        ] {
            let bytes = codec.encode_success_envelope(&value).unwrap();
            assert_eq!(codec.decode_envelope(&bytes).unwrap(), Envelope::Success(value));
        }
    }

    #[test]
    fn test_error_never_mistaken_for_success() {
        let codec = JsonMethodCodec;
        let details = json!(["looks", "like", "an envelope"]);
        let bytes = codec.encode_error_envelope("E1", "bad input", &details).unwrap();
        assert_eq!(bytes.as_ref(), br#"["E1","bad input",["looks","like","an envelope"]]"#);

        match codec.decode_envelope(&bytes).unwrap() {
            Envelope::Error(err) => {
                assert_eq!(err.code, "E1");
                assert_eq!(err.message, "bad input");
                assert_eq!(err.details, details);
            }
            other => panic!("decoded as {other:?}"),
        }

        // A success whose value is a 3-element array stays a success.
        let bytes = codec.encode_success_envelope(&json!(["E1", "x", null])).unwrap();
        assert!(codec.decode_envelope(&bytes).unwrap().is_success());
    }

    #[test]
    fn test_null_message_decodes_empty() {
        let envelope = JsonMethodCodec
            .decode_envelope(br#"["E_FAIL",null,null]"#)
            .unwrap();
        assert_eq!(envelope, Envelope::Error(MethodError::new("E_FAIL", "")));
    }

    #[test]
    fn test_malformed_envelopes() {
        let codec = JsonMethodCodec;
        let payloads: [&[u8]; 4] = [br#"{"ok":1}"#, b"[]", b"[1,2]", br#"[1,"m",null]"#];
        for payload in payloads {
            assert!(matches!(
                codec.decode_envelope(payload),
                Err(CodecError::MalformedEnvelope(_))
            ));
        }
    }
}
