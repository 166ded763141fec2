//! Typed access to tool call arguments.

use serde_json::Value;

use crate::error::{ColloquyError, Result};

/// Tool call arguments as sent by the model.
///
/// Some providers send the arguments object as a JSON-encoded string; the
/// accessors normalize that form on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: Value,
}

impl ToolArguments {
    pub fn new(value: Value) -> Self {
        let value = match value {
            Value::String(raw) if raw.trim().is_empty() => Value::Object(Default::default()),
            Value::String(raw) => serde_json::from_str(raw.trim()).unwrap_or(Value::String(raw)),
            other => other,
        };
        Self { value }
    }

    pub fn raw(&self) -> &Value {
        &self.value
    }

    /// Get a required string argument.
    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.get_str_opt(key)
            .ok_or_else(|| ColloquyError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    /// Get an optional integer argument, accepting numeric strings.
    pub fn get_u64_opt(&self, key: &str) -> Option<u64> {
        let v = self.value.get(key)?;
        v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    }

    /// Deserialize the whole argument object.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            ColloquyError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
