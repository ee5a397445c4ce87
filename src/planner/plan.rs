//! Request-scoped plan and its arena of temporary views
//!
//! Every view a stage creates is registered here the moment the store
//! returns its handle. [`QueryPlan::close`] is the single teardown path:
//! views are dropped in reverse creation order, each exactly once, on
//! success and failure alike. A plan dropped while still holding views
//! (its future was cancelled) hands them to a background task on the
//! current tokio runtime, or reports them as leaked when there is none.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::model::{Stream, TimeWindow, Tuple, ViewSchema};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::store::{ScanSpec, StoreError, TimeSeriesStore, ViewHandle, ViewRef};

use super::errors::{PlannerError, PlannerResult};
use super::request::QueryRequest;

/// Runs one store call under the per-call timeout
pub(crate) async fn guarded<T, F>(operation: &str, timeout: Duration, call: F) -> PlannerResult<T>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(PlannerError::from),
        Err(_) => Err(PlannerError::store_timeout(
            operation,
            timeout.as_millis() as u64,
        )),
    }
}

/// Plan lifecycle; `Closed` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "views", rename_all = "snake_case")]
pub enum PlanState {
    Built,
    /// Number of views materialized so far
    Staged(usize),
    Executing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Correlate,
    Filter,
    Aggregate,
    Noise,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Correlate => "correlate",
            Stage::Filter => "filter",
            Stage::Aggregate => "aggregate",
            Stage::Noise => "noise",
        }
    }
}

/// A temporary view owned by a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Materialization {
    pub stage: Stage,
    pub view: ViewHandle,
}

/// How the row restriction was decided
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessSummary {
    /// Owner reading their own stream
    Owner,
    Unrestricted,
    Restricted,
}

/// Aggregation applied by the plan, for explain output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSummary {
    pub kind: String,
    pub terms: Vec<String>,
    pub calendar: Option<String>,
    pub epsilon: Option<f64>,
    /// Id of the owner rule that forced the aggregation
    pub override_rule: Option<u64>,
}

pub struct QueryPlan {
    request_id: Uuid,
    request: QueryRequest,
    stream: Stream,
    window: TimeWindow,
    predicate: Option<String>,
    source: ViewRef,
    output_schema: ViewSchema,
    materializations: Vec<Materialization>,
    state: PlanState,
    pub(crate) access: AccessSummary,
    pub(crate) aggregate: Option<AggregateSummary>,
    pub(crate) correlated: Vec<String>,
    pub(crate) noise_samples: u64,
    store: Arc<dyn TimeSeriesStore>,
    metrics: Arc<MetricsRegistry>,
    timeout: Duration,
}

impl std::fmt::Debug for QueryPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPlan")
            .field("request_id", &self.request_id)
            .field("stream", &self.stream.name)
            .field("state", &self.state)
            .field("source", &self.source)
            .field("predicate", &self.predicate)
            .field("materializations", &self.materializations)
            .finish()
    }
}

impl QueryPlan {
    pub(crate) fn new(
        request: QueryRequest,
        stream: Stream,
        store: Arc<dyn TimeSeriesStore>,
        metrics: Arc<MetricsRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            window: request.window,
            source: ViewRef::Stream(stream.id),
            output_schema: stream.schema(),
            predicate: None,
            materializations: Vec::new(),
            state: PlanState::Built,
            access: AccessSummary::Unrestricted,
            aggregate: None,
            correlated: Vec::new(),
            noise_samples: 0,
            request,
            stream,
            store,
            metrics,
            timeout,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn request(&self) -> &QueryRequest {
        &self.request
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Window still to apply to `source`
    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Row predicate still to apply to `source`
    pub fn predicate(&self) -> Option<&str> {
        self.predicate.as_deref()
    }

    /// Relation the next stage reads from
    pub fn source(&self) -> &ViewRef {
        &self.source
    }

    /// Columns of the rows the plan yields
    pub fn output_schema(&self) -> &ViewSchema {
        &self.output_schema
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    pub fn materializations(&self) -> &[Materialization] {
        &self.materializations
    }

    pub fn is_closed(&self) -> bool {
        self.state == PlanState::Closed
    }

    pub(crate) fn store(&self) -> &Arc<dyn TimeSeriesStore> {
        &self.store
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn set_window(&mut self, window: TimeWindow) {
        self.window = window;
    }

    pub(crate) fn set_predicate(&mut self, predicate: Option<String>) {
        self.predicate = predicate;
    }

    pub(crate) fn set_output_schema(&mut self, schema: ViewSchema) {
        self.output_schema = schema;
    }

    /// Takes ownership of a fresh view and makes it the current source
    pub(crate) fn register(&mut self, stage: Stage, view: ViewHandle) {
        log_event_with_fields(
            Event::ViewCreated,
            &[
                ("request_id", &self.request_id.to_string()),
                ("stage", stage.as_str()),
                ("view", view.name()),
            ],
        );
        self.metrics.increment_views_materialized();
        self.source = ViewRef::View(view.clone());
        self.materializations.push(Materialization { stage, view });
        self.state = PlanState::Staged(self.materializations.len());
    }

    pub(crate) fn begin_execution(&mut self) {
        if !self.is_closed() {
            self.state = PlanState::Executing;
        }
    }

    /// Reads one page of the final relation
    pub(crate) async fn read(&self, scan: &ScanSpec) -> PlannerResult<Vec<Tuple>> {
        guarded(
            "range_scan",
            self.timeout,
            self.store.range_scan(&self.source, scan),
        )
        .await
    }

    /// Drops every owned view, newest first
    ///
    /// Each view gets exactly one drop request even if some fail; the first
    /// failure is returned. Closing a closed plan does nothing.
    pub async fn close(&mut self) -> PlannerResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.state = PlanState::Closed;

        let request_id = self.request_id.to_string();
        let mut first_error = None;
        let count = self.materializations.len();
        while let Some(owned) = self.materializations.pop() {
            let dropped = guarded(
                "drop_view",
                self.timeout,
                self.store.drop_view(&owned.view),
            )
            .await;
            match dropped {
                Ok(()) => {
                    self.metrics.increment_views_released();
                    log_event_with_fields(
                        Event::ViewReleased,
                        &[("request_id", &request_id), ("view", owned.view.name())],
                    );
                }
                Err(err) => {
                    self.metrics.increment_views_leaked();
                    log_event_with_fields(
                        Event::ViewLeaked,
                        &[
                            ("request_id", &request_id),
                            ("view", owned.view.name()),
                            ("reason", err.message()),
                        ],
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        log_event_with_fields(
            Event::PlanClosed,
            &[("request_id", &request_id), ("views", &count.to_string())],
        );
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for QueryPlan {
    fn drop(&mut self) {
        if self.materializations.is_empty() {
            return;
        }
        let views: Vec<ViewHandle> = self
            .materializations
            .drain(..)
            .rev()
            .map(|m| m.view)
            .collect();
        self.state = PlanState::Closed;
        let request_id = self.request_id.to_string();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let store = Arc::clone(&self.store);
                let metrics = Arc::clone(&self.metrics);
                let timeout = self.timeout;
                runtime.spawn(async move {
                    for view in views {
                        match guarded("drop_view", timeout, store.drop_view(&view)).await {
                            Ok(()) => metrics.increment_views_released(),
                            Err(err) => {
                                metrics.increment_views_leaked();
                                log_event_with_fields(
                                    Event::ViewLeaked,
                                    &[
                                        ("request_id", &request_id),
                                        ("view", view.name()),
                                        ("reason", err.message()),
                                    ],
                                );
                            }
                        }
                    }
                });
            }
            Err(_) => {
                for view in views {
                    self.metrics.increment_views_leaked();
                    log_event_with_fields(
                        Event::ViewLeaked,
                        &[
                            ("request_id", &request_id),
                            ("view", view.name()),
                            ("reason", "plan dropped outside a runtime"),
                        ],
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Channel, ChannelType, StreamId};
    use crate::store::{MemoryStore, StoreOp};

    fn stream() -> Stream {
        Stream {
            id: StreamId::new(1),
            owner: "alice".into(),
            name: "env".into(),
            channels: vec![Channel::new("temp", ChannelType::Float)],
            tags: vec![],
        }
    }

    async fn plan_with_views(store: &Arc<MemoryStore>, metrics: &Arc<MetricsRegistry>, n: usize) -> QueryPlan {
        let shared: Arc<dyn TimeSeriesStore> = store.clone();
        let mut plan = QueryPlan::new(
            QueryRequest::new("bob", "alice", "env"),
            stream(),
            shared,
            Arc::clone(metrics),
            Duration::from_secs(1),
        );
        for _ in 0..n {
            let view = store
                .create_temp_view(ViewSchema::synthetic(&[ChannelType::Float]))
                .await
                .unwrap();
            plan.register(Stage::Filter, view);
        }
        plan
    }

    #[tokio::test]
    async fn test_close_releases_in_reverse_once() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let mut plan = plan_with_views(&store, &metrics, 3).await;
        assert_eq!(plan.state(), PlanState::Staged(3));

        plan.close().await.unwrap();
        plan.close().await.unwrap();
        assert!(plan.is_closed());

        let mut created = store.created_views();
        created.reverse();
        assert_eq!(store.drop_requests(), created);
        assert!(store.live_views().is_empty());
        assert_eq!(metrics.snapshot().views_outstanding(), 0);
    }

    #[tokio::test]
    async fn test_close_attempts_every_view_on_failure() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let mut plan = plan_with_views(&store, &metrics, 2).await;
        store.fail_on(StoreOp::DropView);

        let err = plan.close().await.unwrap_err();
        assert_eq!(err.code(), crate::planner::PlannerErrorCode::SgStoreFailed);
        assert_eq!(store.drop_requests().len(), 2);
        assert_eq!(metrics.snapshot().views_leaked, 2);
    }

    #[tokio::test]
    async fn test_drop_releases_on_runtime() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let plan = plan_with_views(&store, &metrics, 2).await;
        drop(plan);

        for _ in 0..50 {
            if store.live_views().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(store.live_views().is_empty());
        assert_eq!(store.drop_requests().len(), 2);
    }
}
