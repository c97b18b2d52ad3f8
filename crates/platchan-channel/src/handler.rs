use serde::de::DeserializeOwned;
use serde_json::Value;

use platchan_codec::MethodError;

/// Error code used when a handler cannot decode its arguments.
pub const INVALID_ARGUMENTS: &str = "invalid_arguments";

/// Handles one method on one channel.
///
/// Returning `Err` answers the caller with an error envelope carrying the
/// same `code`, `message` and `details`.
pub trait MethodHandler: Send + Sync {
    fn handle_method(&self, arguments: Value) -> Result<Value, MethodError>;
}

impl<F> MethodHandler for F
where
    F: Fn(Value) -> Result<Value, MethodError> + Send + Sync,
{
    fn handle_method(&self, arguments: Value) -> Result<Value, MethodError> {
        self(arguments)
    }
}

/// Deserialize handler arguments, mapping failure to an
/// [`INVALID_ARGUMENTS`] method error.
pub fn decode_arguments<T: DeserializeOwned>(method: &str, arguments: Value) -> Result<T, MethodError> {
    serde_json::from_value(arguments).map_err(|err| {
        MethodError::new(
            INVALID_ARGUMENTS,
            format!("failed to decode arguments for {method}: {err}"),
        )
    })
}
