//! Typed access to tool call arguments.

use crate::error::AiboxError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Parse the accumulated argument text of a streamed tool call.
    ///
    /// Empty text means "no arguments". Text that is not valid JSON is kept as
    /// a string value so tools can report it back to the model.
    pub fn from_buffer(buffer: &str) -> Self {
        let trimmed = buffer.trim();
        if trimmed.is_empty() {
            return Self::new(serde_json::json!({}));
        }
        match serde_json::from_str(trimmed) {
            Ok(value) => Self::new(value),
            Err(_) => Self::new(serde_json::Value::String(buffer.to_string())),
        }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, AiboxError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| AiboxError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get a float argument.
    pub fn get_f64(&self, key: &str) -> Result<f64, AiboxError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| AiboxError::InvalidArgument(format!("Missing float argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, AiboxError> {
        let value = match &self.value {
            serde_json::Value::String(raw) => {
                serde_json::from_str::<serde_json::Value>(raw.trim()).map_err(|e| {
                    AiboxError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
                })?
            }
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|e| {
            AiboxError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
