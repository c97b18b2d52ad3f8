use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named invocation carried on a channel.
///
/// Method names are channel-local; the same name on two channels means two
/// unrelated methods.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// A call with `null` arguments.
    pub fn without_arguments(method: impl Into<String>) -> Self {
        Self::new(method, Value::Null)
    }
}

/// Structured error carried by an error envelope.
///
/// This is what a failing method handler returns and what the invoking side
/// receives, so callers can branch on `code` without parsing text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct MethodError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl MethodError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// A decoded reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success(Value),
    Error(MethodError),
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The success value, or the typed error.
    pub fn into_result(self) -> Result<Value, MethodError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Error(err) => Err(err),
        }
    }
}

impl From<Result<Value, MethodError>> for Envelope {
    fn from(result: Result<Value, MethodError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Error(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_error_display() {
        let err = MethodError::new("E1", "bad input").with_details(json!({"field": "x"}));
        assert_eq!(err.to_string(), "E1: bad input");
        assert_eq!(err.details["field"], "x");
    }

    #[test]
    fn test_envelope_into_result() {
        assert_eq!(Envelope::Success(json!(3)).into_result(), Ok(json!(3)));

        let envelope = Envelope::from(Err(MethodError::new("E2", "nope")));
        assert!(!envelope.is_success());
        assert_eq!(envelope.into_result().unwrap_err().code, "E2");
    }
}
