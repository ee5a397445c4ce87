use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::{BoundAggregate, Calendar};
use crate::model::{Stream, StreamId, TimeWindow, Tuple, ViewSchema};

use super::errors::StoreResult;

/// Owned handle to a temporary view
///
/// The name embeds a random v4 token so concurrent plans never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ViewHandle {
    id: Uuid,
    name: String,
}

impl ViewHandle {
    pub fn new(prefix: &str) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            name: format!("{}_{}", prefix, id.simple()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Source relation of a store call: a stream's own rows or a temporary view
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "ref", rename_all = "lowercase")]
pub enum ViewRef {
    Stream(StreamId),
    View(ViewHandle),
}

impl ViewRef {
    pub fn describe(&self) -> String {
        match self {
            ViewRef::Stream(id) => format!("stream:{}", id),
            ViewRef::View(handle) => format!("view:{}", handle.name()),
        }
    }
}

impl From<&ViewHandle> for ViewRef {
    fn from(handle: &ViewHandle) -> Self {
        ViewRef::View(handle.clone())
    }
}

impl From<StreamId> for ViewRef {
    fn from(id: StreamId) -> Self {
        ViewRef::Stream(id)
    }
}

/// Parameters of a range scan or materialization
///
/// `predicate` is evaluated against the source's column names. `width`
/// keeps only the leading columns. `offset` and `limit` page the result
/// after filtering, in timestamp order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScanSpec {
    pub window: TimeWindow,
    pub predicate: Option<String>,
    pub width: Option<usize>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl ScanSpec {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    pub fn with_predicate(mut self, predicate: Option<String>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_page(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// Operations the query core needs from a time-series engine
///
/// Implementations must be shareable across tasks. Every method that returns
/// a [`ViewHandle`] transfers ownership of a fresh temporary view to the
/// caller.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Prepares storage for a newly registered stream
    async fn create_stream(&self, stream: &Stream) -> StoreResult<()>;

    async fn append_tuple(&self, stream: StreamId, tuple: Tuple) -> StoreResult<()>;

    /// Appends rows to a stream or temporary view, returning the row count
    async fn bulk_load(&self, target: &ViewRef, rows: Vec<Tuple>) -> StoreResult<u64>;

    /// Removes a stream's rows inside `window`, returning how many went
    async fn delete_range(&self, stream: StreamId, window: &TimeWindow) -> StoreResult<u64>;

    async fn range_scan(&self, source: &ViewRef, scan: &ScanSpec) -> StoreResult<Vec<Tuple>>;

    /// Rows of `source` inside `window`, ignoring any predicate
    async fn count_in_range(&self, source: &ViewRef, window: &TimeWindow) -> StoreResult<u64>;

    /// Empty temporary view with the given columns
    async fn create_temp_view(&self, schema: ViewSchema) -> StoreResult<ViewHandle>;

    /// Temporary view holding the result of a scan
    async fn materialize(&self, source: &ViewRef, scan: &ScanSpec) -> StoreResult<ViewHandle>;

    async fn drop_view(&self, handle: &ViewHandle) -> StoreResult<()>;

    /// One row per non-empty calendar bucket, stamped with the bucket start
    async fn aggregate_by_calendar(
        &self,
        source: &ViewRef,
        aggregate: &BoundAggregate,
        calendar: Calendar,
        window: &TimeWindow,
    ) -> StoreResult<ViewHandle>;

    /// At most one row covering the whole window
    async fn aggregate_range(
        &self,
        source: &ViewRef,
        aggregate: &BoundAggregate,
        window: &TimeWindow,
    ) -> StoreResult<ViewHandle>;

    /// Time-aligned union of several streams
    ///
    /// The first stream is primary: the view has one row per primary row in
    /// `window`, carrying the primary's values followed by the most recent
    /// values at or before that instant from each other stream, in order.
    /// Columns are named `channel1..channelN`.
    async fn union_align(&self, streams: &[StreamId], window: &TimeWindow) -> StoreResult<ViewHandle>;
}
