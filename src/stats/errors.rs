use thiserror::Error;

pub type StatsResult<T> = Result<T, StatsError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("stream {stream} has {expected} channels, tuple has {actual} values")]
    Arity {
        stream: String,
        expected: usize,
        actual: usize,
    },
}
