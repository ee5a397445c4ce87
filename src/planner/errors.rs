//! Planner error types
//!
//! Error codes:
//! - SG_AGGREGATE_INVALID_EXPRESSION (REJECT)
//! - SG_AGGREGATE_UNKNOWN_KIND (REJECT)
//! - SG_CHANNEL_UNSUPPORTED_TYPE (REJECT)
//! - SG_NOISE_DEGENERATE_SENSITIVITY (REJECT)
//! - SG_NOISE_INVALID_PARAMETER (REJECT)
//! - SG_WINDOW_REQUIRED (REJECT)
//! - SG_WINDOW_TOO_LARGE (REJECT)
//! - SG_WINDOW_INVALID (REJECT)
//! - SG_ACCESS_DENIED (REJECT)
//! - SG_STREAM_NOT_FOUND (REJECT)
//! - SG_PREDICATE_INVALID (REJECT)
//! - SG_STORE_FAILED (ERROR)
//! - SG_STORE_TIMEOUT (ERROR)

use std::fmt;

use crate::aggregate::{AggregateError, AggregateErrorCode};
use crate::correlate::CorrelateError;
use crate::model::WindowViolation;
use crate::predicate::PredicateError;
use crate::privacy::NoiseError;
use crate::store::{CatalogError, StoreError};

/// Severity levels for planner errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Request rejected; retrying unchanged fails the same way
    Reject,
    /// A collaborator failed
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    SgAggregateInvalidExpression,
    SgAggregateUnknownKind,
    SgChannelUnsupportedType,
    /// Zero-width range or no statistics for a noised channel
    SgNoiseDegenerateSensitivity,
    /// Epsilon or sample count out of range
    SgNoiseInvalidParameter,
    SgWindowRequired,
    SgWindowTooLarge,
    /// Start after end
    SgWindowInvalid,
    /// Resolver produced Deny
    SgAccessDenied,
    SgStreamNotFound,
    SgPredicateInvalid,
    SgStoreFailed,
    SgStoreTimeout,
}

impl PlannerErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::SgAggregateInvalidExpression => "SG_AGGREGATE_INVALID_EXPRESSION",
            PlannerErrorCode::SgAggregateUnknownKind => "SG_AGGREGATE_UNKNOWN_KIND",
            PlannerErrorCode::SgChannelUnsupportedType => "SG_CHANNEL_UNSUPPORTED_TYPE",
            PlannerErrorCode::SgNoiseDegenerateSensitivity => "SG_NOISE_DEGENERATE_SENSITIVITY",
            PlannerErrorCode::SgNoiseInvalidParameter => "SG_NOISE_INVALID_PARAMETER",
            PlannerErrorCode::SgWindowRequired => "SG_WINDOW_REQUIRED",
            PlannerErrorCode::SgWindowTooLarge => "SG_WINDOW_TOO_LARGE",
            PlannerErrorCode::SgWindowInvalid => "SG_WINDOW_INVALID",
            PlannerErrorCode::SgAccessDenied => "SG_ACCESS_DENIED",
            PlannerErrorCode::SgStreamNotFound => "SG_STREAM_NOT_FOUND",
            PlannerErrorCode::SgPredicateInvalid => "SG_PREDICATE_INVALID",
            PlannerErrorCode::SgStoreFailed => "SG_STORE_FAILED",
            PlannerErrorCode::SgStoreTimeout => "SG_STORE_TIMEOUT",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            PlannerErrorCode::SgStoreFailed | PlannerErrorCode::SgStoreTimeout => Severity::Error,
            _ => Severity::Reject,
        }
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Planner error type with full context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerError {
    code: PlannerErrorCode,
    message: String,
}

impl PlannerError {
    fn new(code: PlannerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn access_denied(user: &str, owner: &str, stream: &str) -> Self {
        Self::new(
            PlannerErrorCode::SgAccessDenied,
            format!("user '{}' may not read {}/{}", user, owner, stream),
        )
    }

    pub fn stream_not_found(owner: &str, stream: &str) -> Self {
        Self::new(
            PlannerErrorCode::SgStreamNotFound,
            format!("stream {}/{} does not exist", owner, stream),
        )
    }

    pub fn window_required(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::SgWindowRequired, reason)
    }

    pub fn window_too_large(span_secs: i64, max_secs: i64) -> Self {
        Self::new(
            PlannerErrorCode::SgWindowTooLarge,
            format!("window spans {}s, at most {}s allowed", span_secs, max_secs),
        )
    }

    pub fn window_invalid(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::SgWindowInvalid, reason)
    }

    pub fn predicate_invalid(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::SgPredicateInvalid, reason)
    }

    pub fn degenerate_sensitivity(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::SgNoiseDegenerateSensitivity, reason)
    }

    pub fn store_failed(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::SgStoreFailed, reason)
    }

    pub fn store_timeout(operation: &str, timeout_ms: u64) -> Self {
        Self::new(
            PlannerErrorCode::SgStoreTimeout,
            format!("{} did not finish within {}ms", operation, timeout_ms),
        )
    }

    pub fn code(&self) -> PlannerErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Denials are shown to callers as empty results, unlike other failures
    pub fn is_access_denied(&self) -> bool {
        self.code == PlannerErrorCode::SgAccessDenied
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code, self.message)
    }
}

impl std::error::Error for PlannerError {}

impl From<AggregateError> for PlannerError {
    fn from(err: AggregateError) -> Self {
        let code = match err.code() {
            AggregateErrorCode::SgAggregateInvalidExpression => {
                PlannerErrorCode::SgAggregateInvalidExpression
            }
            AggregateErrorCode::SgAggregateUnknownKind => PlannerErrorCode::SgAggregateUnknownKind,
            AggregateErrorCode::SgChannelUnsupportedType => PlannerErrorCode::SgChannelUnsupportedType,
        };
        Self::new(code, err.message())
    }
}

impl From<NoiseError> for PlannerError {
    fn from(err: NoiseError) -> Self {
        let code = match &err {
            NoiseError::UnknownAggregateKind(_) => PlannerErrorCode::SgAggregateUnknownKind,
            NoiseError::DegenerateSensitivity { .. } => PlannerErrorCode::SgNoiseDegenerateSensitivity,
            NoiseError::InvalidEpsilon(_) | NoiseError::InvalidSampleCount => {
                PlannerErrorCode::SgNoiseInvalidParameter
            }
        };
        Self::new(code, err.to_string())
    }
}

impl From<WindowViolation> for PlannerError {
    fn from(violation: WindowViolation) -> Self {
        match violation {
            WindowViolation::Missing => Self::window_required(violation.to_string()),
            WindowViolation::TooLarge {
                span_secs,
                max_secs,
            } => Self::window_too_large(span_secs, max_secs),
            WindowViolation::Inverted => Self::window_invalid(violation.to_string()),
        }
    }
}

impl From<PredicateError> for PlannerError {
    fn from(err: PredicateError) -> Self {
        Self::predicate_invalid(err.to_string())
    }
}

impl From<CorrelateError> for PlannerError {
    fn from(err: CorrelateError) -> Self {
        match err {
            CorrelateError::Window(violation) => violation.into(),
            other => Self::predicate_invalid(other.to_string()),
        }
    }
}

impl From<StoreError> for PlannerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Predicate(inner) => inner.into(),
            other => Self::store_failed(other.to_string()),
        }
    }
}

impl From<CatalogError> for PlannerError {
    fn from(err: CatalogError) -> Self {
        match &err {
            CatalogError::StreamNotFound { owner, name } => Self::stream_not_found(owner, name),
            _ => Self::store_failed(err.to_string()),
        }
    }
}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreOp;

    #[test]
    fn test_display_format() {
        let err = PlannerError::access_denied("bob", "alice", "env");
        assert!(err.is_access_denied());
        assert_eq!(
            err.to_string(),
            "[REJECT] SG_ACCESS_DENIED: user 'bob' may not read alice/env"
        );
        let err = PlannerError::store_timeout("materialize", 10);
        assert_eq!(err.severity(), Severity::Error);
        assert!(err.to_string().starts_with("[ERROR] SG_STORE_TIMEOUT"));
    }

    #[test]
    fn test_window_violation_codes() {
        assert_eq!(
            PlannerError::from(WindowViolation::Missing).code(),
            PlannerErrorCode::SgWindowRequired
        );
        assert_eq!(
            PlannerError::from(WindowViolation::TooLarge {
                span_secs: 10,
                max_secs: 5
            })
            .code(),
            PlannerErrorCode::SgWindowTooLarge
        );
        assert_eq!(
            PlannerError::from(CorrelateError::Window(WindowViolation::Inverted)).code(),
            PlannerErrorCode::SgWindowInvalid
        );
    }

    #[test]
    fn test_leaf_errors_lifted() {
        let noise = NoiseError::DegenerateSensitivity {
            aggregate: "max".into(),
            min: 1.0,
            max: 1.0,
        };
        assert_eq!(
            PlannerError::from(noise).code(),
            PlannerErrorCode::SgNoiseDegenerateSensitivity
        );
        assert_eq!(
            PlannerError::from(AggregateError::unknown_kind("mode")).code(),
            PlannerErrorCode::SgAggregateUnknownKind
        );
        assert_eq!(
            PlannerError::from(StoreError::Injected(StoreOp::UnionAlign)).code(),
            PlannerErrorCode::SgStoreFailed
        );
        assert_eq!(
            PlannerError::from(StoreError::Predicate(PredicateError::UnknownColumn("x".into()))).code(),
            PlannerErrorCode::SgPredicateInvalid
        );
    }
}
