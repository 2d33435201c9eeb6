//! Reply envelope decoding.
//!
//! Contract methods answer with a one-key object: `{"=": value}` on success
//! or `{"!": message}` on failure. Anything else is a protocol violation.

use serde_json::Value;

use super::InvokeError;

/// Key carrying a successful result.
pub const SUCCESS_KEY: &str = "=";
/// Key carrying a failure message.
pub const FAILURE_KEY: &str = "!";

/// Decoded reply of a remote method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// The method succeeded with this payload.
    Success(Value),
    /// The method reported this failure.
    Failure(String),
}

impl Envelope {
    /// Classify a raw reply.
    ///
    /// A failure payload that is not a string is kept as its JSON text.
    pub fn decode(reply: Value) -> Result<Self, InvokeError> {
        let mut map = match reply {
            Value::Object(map) => map,
            other => {
                return Err(InvokeError::protocol(format!(
                    "expected an envelope object, got {other}"
                )));
            }
        };
        if map.len() != 1 {
            return Err(InvokeError::protocol(format!(
                "envelope must have exactly one key, got {}",
                Value::Object(map)
            )));
        }
        if let Some(value) = map.remove(SUCCESS_KEY) {
            return Ok(Self::Success(value));
        }
        if let Some(message) = map.remove(FAILURE_KEY) {
            return Ok(Self::Failure(match message {
                Value::String(s) => s,
                other => other.to_string(),
            }));
        }
        Err(InvokeError::protocol(format!(
            "unknown envelope key in {}",
            Value::Object(map)
        )))
    }

    /// Turn the envelope into the call's result.
    pub fn into_result(self) -> Result<Value, InvokeError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(message) => Err(InvokeError::Remote(message)),
        }
    }
}
