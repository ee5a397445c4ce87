use thiserror::Error;

use crate::model::ConformError;
use crate::stats::StatsError;
use crate::store::{CatalogError, StoreError};

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("stream '{owner}/{name}' not found")]
    StreamNotFound { owner: String, name: String },

    #[error("malformed input at row {row}: {reason}")]
    Malformed { row: usize, reason: String },

    #[error("row {row}: {source}")]
    Conform {
        row: usize,
        #[source]
        source: ConformError,
    },

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("store call timed out")]
    Timeout,
}
