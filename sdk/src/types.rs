//! Capability input/output types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arguments passed to a capability.
///
/// A flat JSON object. The executor always supplies an `input` field holding
/// the task description followed by the accumulated run context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityArgs {
    pub params: Map<String, Value>,
}

impl CapabilityArgs {
    /// Create empty arguments
    pub fn new() -> Self {
        Self::default()
    }

    /// Build arguments from a JSON value. Non-objects yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(params) => Some(Self { params }),
            _ => None,
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Insert or replace a parameter
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.params.insert(key.into(), value);
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Result<&str, ArgError> {
        match self.params.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(ArgError::InvalidParameter(key.to_string())),
            None => Err(ArgError::MissingParameter(key.to_string())),
        }
    }

    /// Get an unsigned integer parameter
    pub fn param_u64(&self, key: &str) -> Result<u64, ArgError> {
        match self.params.get(key) {
            Some(v) => v
                .as_u64()
                .ok_or_else(|| ArgError::InvalidParameter(key.to_string())),
            None => Err(ArgError::MissingParameter(key.to_string())),
        }
    }

    /// Get an optional string parameter
    pub fn param_str_opt(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Get an optional bool parameter
    pub fn param_bool_opt(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(|v| v.as_bool())
    }

    /// Get a parameter as a JSON value
    pub fn param_json(&self, key: &str) -> Result<&Value, ArgError> {
        self.params
            .get(key)
            .ok_or_else(|| ArgError::MissingParameter(key.to_string()))
    }

    /// The task input text supplied by the executor, empty when absent.
    pub fn input(&self) -> &str {
        self.param_str_opt(INPUT_KEY).unwrap_or_default()
    }
}

/// Reserved argument key carrying the task description and run context.
pub const INPUT_KEY: &str = "input";

/// Output from a capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutput {
    /// Text appended to the run context
    pub text: String,

    /// Structured data (post ids, record ids, snapshots)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl CapabilityOutput {
    /// Create a text-only output
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: Value::Null,
        }
    }

    /// Create an output with text and structured data
    pub fn with_data(text: impl Into<String>, data: Value) -> Self {
        Self {
            text: text.into(),
            data,
        }
    }
}

/// Argument access errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ArgError {
    /// Attribute the error to a capability as a schema violation.
    pub fn for_capability(self, capability: &str) -> crate::errors::EngineError {
        crate::errors::EngineError::schema(capability, self.to_string())
    }
}
