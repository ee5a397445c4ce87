//! Tuples and channel values

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::stream::{Channel, ChannelType};

/// A single channel value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value; text and null have none
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A timestamped row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    pub timestamp: DateTime<Utc>,
    pub values: Vec<Value>,
}

impl Tuple {
    pub fn new(timestamp: DateTime<Utc>, values: Vec<Value>) -> Self {
        Self { timestamp, values }
    }

    /// Value at `ordinal`, NULL when the row is narrower
    pub fn value(&self, ordinal: usize) -> &Value {
        self.values.get(ordinal).unwrap_or(&Value::Null)
    }

    /// Keeps only the first `width` values
    pub fn project(mut self, width: usize) -> Self {
        self.values.truncate(width);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConformError {
    #[error("expected {expected} values, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("channel '{channel}' expects {expected}, got {found}")]
    Type {
        channel: String,
        expected: ChannelType,
        found: &'static str,
    },
}

/// Checks raw values against channel declarations
///
/// Integers widen into float channels and numeric text is accepted for
/// numeric channels. Anything else that disagrees with the declared type
/// is rejected.
pub fn conform_values(channels: &[Channel], values: Vec<Value>) -> Result<Vec<Value>, ConformError> {
    if values.len() != channels.len() {
        return Err(ConformError::Arity {
            expected: channels.len(),
            actual: values.len(),
        });
    }

    channels
        .iter()
        .zip(values)
        .map(|(channel, value)| conform_one(channel, value))
        .collect()
}

fn conform_one(channel: &Channel, value: Value) -> Result<Value, ConformError> {
    let mismatch = |found: &'static str| ConformError::Type {
        channel: channel.name.clone(),
        expected: channel.channel_type,
        found,
    };

    match (channel.channel_type, value) {
        (_, Value::Null) => Ok(Value::Null),
        (ChannelType::Int, Value::Int(i)) => Ok(Value::Int(i)),
        (ChannelType::Int, Value::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
            Ok(Value::Int(f as i64))
        }
        (ChannelType::Int, Value::Text(s)) => {
            s.trim().parse::<i64>().map(Value::Int).map_err(|_| mismatch("text"))
        }
        (ChannelType::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
        (ChannelType::Float, Value::Float(f)) => Ok(Value::Float(f)),
        (ChannelType::Float, Value::Text(s)) => {
            s.trim().parse::<f64>().map(Value::Float).map_err(|_| mismatch("text"))
        }
        (ChannelType::Text, Value::Text(s)) => Ok(Value::Text(s)),
        (ChannelType::Text, other) => Ok(Value::Text(other.to_string())),
        (_, other) => Err(mismatch(other.type_name())),
    }
}
