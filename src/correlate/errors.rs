use thiserror::Error;

use crate::model::WindowViolation;
use crate::predicate::PredicateError;

pub type CorrelateResult<T> = Result<T, CorrelateError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorrelateError {
    #[error("cross-stream predicates need a window: {0}")]
    Window(WindowViolation),

    #[error("stream '{stream}' has no channel '{channel}'")]
    UnknownChannel { stream: String, channel: String },

    #[error("reference '{0}' must be separated from surrounding text by whitespace")]
    UnresolvedReference(String),

    #[error(transparent)]
    Predicate(#[from] PredicateError),
}
