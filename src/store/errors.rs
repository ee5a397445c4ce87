use std::fmt;

use thiserror::Error;

use crate::model::StreamId;
use crate::predicate::PredicateError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store operations, used to label failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateStream,
    AppendTuple,
    BulkLoad,
    DeleteRange,
    RangeScan,
    CountInRange,
    CreateTempView,
    Materialize,
    DropView,
    AggregateByCalendar,
    AggregateRange,
    UnionAlign,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::CreateStream => "create_stream",
            StoreOp::AppendTuple => "append_tuple",
            StoreOp::BulkLoad => "bulk_load",
            StoreOp::DeleteRange => "delete_range",
            StoreOp::RangeScan => "range_scan",
            StoreOp::CountInRange => "count_in_range",
            StoreOp::CreateTempView => "create_temp_view",
            StoreOp::Materialize => "materialize",
            StoreOp::DropView => "drop_view",
            StoreOp::AggregateByCalendar => "aggregate_by_calendar",
            StoreOp::AggregateRange => "aggregate_range",
            StoreOp::UnionAlign => "union_align",
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("stream {0} does not exist in the store")]
    UnknownStream(StreamId),

    #[error("stream {0} already exists in the store")]
    DuplicateStream(StreamId),

    #[error("view '{0}' does not exist")]
    UnknownView(String),

    #[error("row has {actual} values, relation has {expected} columns")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("predicate rejected: {0}")]
    Predicate(#[from] PredicateError),

    #[error("{0} failed (injected)")]
    Injected(StoreOp),

    #[error("store state lock poisoned")]
    Poisoned,

    #[error("backend error: {0}")]
    Backend(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("stream '{owner}/{name}' not found")]
    StreamNotFound { owner: String, name: String },

    #[error("stream '{owner}/{name}' already exists")]
    DuplicateStream { owner: String, name: String },

    #[error("invalid stream definition: {0}")]
    InvalidStream(String),

    #[error("rule {0} not found")]
    RuleNotFound(u64),

    #[error("invalid macro: {0}")]
    InvalidMacro(String),

    #[error(transparent)]
    Policy(#[from] crate::policy::PolicyError),

    #[error("catalog state lock poisoned")]
    Poisoned,
}
