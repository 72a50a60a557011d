//! Decoded document descriptions received over HTTP.
//!
//! The pipeline treats every field as opaque except `title`, which names the
//! downloaded file, and `strict`, which lets a client opt into validation.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while decoding a request body into a [`Payload`].
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed JSON body: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("expected a JSON object at the document root, found {found}")]
    NotAnObject { found: &'static str },
}

/// An immutable, parsed document description.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    fields: Map<String, Value>,
}

impl Payload {
    /// Decode a UTF-8 JSON body. Anything other than a top-level object is rejected.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(PayloadError::NotAnObject {
                found: json_kind(&other),
            }),
        }
    }

    /// The document title, when present and a string.
    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }

    /// Whether the client asked for strict validation. Only a literal `true` counts.
    pub fn is_strict(&self) -> bool {
        matches!(self.fields.get("strict"), Some(Value::Bool(true)))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Human-readable name of a JSON value's type, used in diagnostics.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
