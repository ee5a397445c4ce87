//! Aggregate expression errors
//!
//! Error codes:
//! - SG_AGGREGATE_INVALID_EXPRESSION (REJECT)
//! - SG_AGGREGATE_UNKNOWN_KIND (REJECT)
//! - SG_CHANNEL_UNSUPPORTED_TYPE (REJECT)

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateErrorCode {
    /// Unrecognized head, wrong arity, bad epsilon, bad term syntax
    SgAggregateInvalidExpression,
    /// Term function outside the supported set
    SgAggregateUnknownKind,
    /// Term targets a non-numeric channel
    SgChannelUnsupportedType,
}

impl AggregateErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            AggregateErrorCode::SgAggregateInvalidExpression => "SG_AGGREGATE_INVALID_EXPRESSION",
            AggregateErrorCode::SgAggregateUnknownKind => "SG_AGGREGATE_UNKNOWN_KIND",
            AggregateErrorCode::SgChannelUnsupportedType => "SG_CHANNEL_UNSUPPORTED_TYPE",
        }
    }
}

impl fmt::Display for AggregateErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateError {
    code: AggregateErrorCode,
    message: String,
}

impl AggregateError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            code: AggregateErrorCode::SgAggregateInvalidExpression,
            message: reason.into(),
        }
    }

    pub fn unknown_kind(name: &str) -> Self {
        Self {
            code: AggregateErrorCode::SgAggregateUnknownKind,
            message: format!("unknown aggregate function '{}'", name),
        }
    }

    pub fn unsupported_channel(channel: &str, channel_type: impl fmt::Display) -> Self {
        Self {
            code: AggregateErrorCode::SgChannelUnsupportedType,
            message: format!(
                "channel '{}' has type {} which cannot be aggregated",
                channel, channel_type
            ),
        }
    }

    pub fn code(&self) -> AggregateErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REJECT] {}: {}", self.code, self.message)
    }
}

impl std::error::Error for AggregateError {}

pub type AggregateResult<T> = Result<T, AggregateError>;
