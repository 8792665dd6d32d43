//! Typed access to tool call arguments.

use serde_json::Value;

use crate::error::BujjiError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: Value,
}

impl ToolArguments {
    /// Wrap raw arguments. A JSON string holding an object is unpacked,
    /// since some models double-encode their arguments.
    pub fn new(value: Value) -> Self {
        let value = match value {
            Value::String(raw) => match serde_json::from_str::<Value>(raw.trim()) {
                Ok(parsed @ Value::Object(_)) => parsed,
                _ => Value::String(raw),
            },
            other => other,
        };
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, BujjiError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| BujjiError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument. Whole floats and numeric strings are accepted.
    pub fn get_i64(&self, key: &str) -> Result<i64, BujjiError> {
        self.get_i64_opt(key)
            .ok_or_else(|| BujjiError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    pub fn get_i64_opt(&self, key: &str) -> Option<i64> {
        let v = self.value.get(key)?;
        v.as_i64()
            .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    }

    /// Get a float argument.
    pub fn get_f64(&self, key: &str) -> Result<f64, BujjiError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| BujjiError::InvalidArgument(format!("Missing float argument: {key}")))
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool, BujjiError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| BujjiError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, BujjiError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            BujjiError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
