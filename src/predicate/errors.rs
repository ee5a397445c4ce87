use thiserror::Error;

pub type PredicateResult<T> = Result<T, PredicateError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("expected {expected} at offset {offset}, found {found}")]
    Syntax {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{function}() takes {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("cross-stream reference '{0}' was not resolved")]
    UnresolvedReference(String),

    #[error("invalid time filter '[{filter}]': {reason}")]
    InvalidTimeFilter { filter: String, reason: String },
}
