//! Read request as received from the caller

use serde::{Deserialize, Serialize};

use crate::model::TimeWindow;

/// One read of one stream
///
/// `filter` and `aggregator` are caller-supplied text; an aggregate
/// override from the stream owner's rules replaces `aggregator`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub requesting_user: String,
    pub stream_owner: String,
    pub stream_name: String,
    #[serde(default)]
    pub window: TimeWindow,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub aggregator: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl QueryRequest {
    pub fn new(
        requesting_user: impl Into<String>,
        stream_owner: impl Into<String>,
        stream_name: impl Into<String>,
    ) -> Self {
        Self {
            requesting_user: requesting_user.into(),
            stream_owner: stream_owner.into(),
            stream_name: stream_name.into(),
            ..Default::default()
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_aggregator(mut self, aggregator: impl Into<String>) -> Self {
        self.aggregator = Some(aggregator.into());
        self
    }

    pub fn with_page(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Owners reading their own streams skip rule resolution
    pub fn is_owner_read(&self) -> bool {
        self.requesting_user == self.stream_owner
    }

    /// Caller filter, blank counts as absent
    pub fn filter_text(&self) -> Option<&str> {
        self.filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    pub fn aggregator_text(&self) -> Option<&str> {
        self.aggregator
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}
