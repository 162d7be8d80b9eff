//! Queue job model
//!
//! A job is pulled from the queue service as `{id, kind, instance, parameters}`
//! where `parameters` is pre-encoded JSON text. It is immutable once pulled.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A unit of enrichment work obtained from the queue service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Queue-assigned job id
    pub id: i64,
    /// Job kind, selects the handler
    #[serde(alias = "job")]
    pub kind: String,
    /// Instance the job targets; null on the wire reads as empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub instance: String,
    /// Encoded parameters, usually JSON text
    #[serde(default)]
    pub parameters: Value,
}

impl Job {
    /// Decode the `parameters` field into a parameter map.
    ///
    /// Accepts JSON text (the queue's wire form), an already-decoded object,
    /// or nothing at all.
    pub fn decode_parameters(&self) -> Result<JobParameters> {
        match &self.parameters {
            Value::Null => Ok(JobParameters::default()),
            Value::Object(map) => Ok(JobParameters::from(map.clone())),
            Value::String(text) if text.trim().is_empty() => Ok(JobParameters::default()),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => Ok(JobParameters::from(map)),
                Ok(other) => Err(Error::InvalidInput(format!(
                    "job {} parameters must be an object, got {}",
                    self.id,
                    json_type(&other)
                ))),
                Err(e) => Err(Error::InvalidInput(format!(
                    "job {} parameters are not valid JSON: {}",
                    self.id, e
                ))),
            },
            other => Err(Error::InvalidInput(format!(
                "job {} parameters must be JSON text, got {}",
                self.id,
                json_type(other)
            ))),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parameter lookup failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    /// Key absent, null, or an empty string
    #[error("missing required parameter '{0}'")]
    Missing(String),

    /// Key present but the value has the wrong shape
    #[error("invalid parameter '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

/// Decoded job parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobParameters(Map<String, Value>);

impl From<Map<String, Value>> for JobParameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl JobParameters {
    /// Raw value if present and non-empty
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.0.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(v) => Some(v),
        }
    }

    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn required_str(&self, key: &str) -> std::result::Result<&str, ParameterError> {
        match self.get(key) {
            None => Err(ParameterError::Missing(key.to_string())),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(ParameterError::Invalid {
                key: key.to_string(),
                reason: format!("expected string, got {}", json_type(other)),
            }),
        }
    }

    /// Integer parameter; numeric strings are accepted
    pub fn required_i64(&self, key: &str) -> std::result::Result<i64, ParameterError> {
        let invalid = |reason: String| ParameterError::Invalid {
            key: key.to_string(),
            reason,
        };
        match self.get(key) {
            None => Err(ParameterError::Missing(key.to_string())),
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| invalid(format!("{} is not an integer", n))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| invalid(format!("'{}' is not an integer", s))),
            Some(other) => Err(invalid(format!("expected integer, got {}", json_type(other)))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
