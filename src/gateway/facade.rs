use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::aggregate::{parse_aggregate_expr, AggregateResult, AggregateSpec};
use crate::model::{conform_values, Stream, TimeWindow, Tuple, Value};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::planner::{ExplainPlan, PlanCursor, PlannerConfig, PlannerResult, QueryPlanner, QueryRequest};
use crate::policy::AccessDecision;
use crate::stats::{ChannelStatisticsTracker, StatsResult};
use crate::store::{MetadataCatalog, StoreError, TimeSeriesStore, ViewRef};

use super::errors::{IngestError, IngestResult};
use super::ingest::{parse_csv, parse_json_tuples, RawTuple};

/// Entry point for the request layer
///
/// Owns the planner and the shared channel statistics, and routes ingest
/// through the store so every stored value is also tracked.
pub struct SensorGate {
    store: Arc<dyn TimeSeriesStore>,
    catalog: Arc<dyn MetadataCatalog>,
    tracker: Arc<ChannelStatisticsTracker>,
    planner: QueryPlanner,
    metrics: Arc<MetricsRegistry>,
    timeout: Duration,
}

impl SensorGate {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        catalog: Arc<dyn MetadataCatalog>,
        config: PlannerConfig,
    ) -> Self {
        let tracker = Arc::new(ChannelStatisticsTracker::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let timeout = config.store_call_timeout();
        let planner = QueryPlanner::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            Arc::clone(&tracker),
            config,
        )
        .with_metrics(Arc::clone(&metrics));
        Self {
            store,
            catalog,
            tracker,
            planner,
            metrics,
            timeout,
        }
    }

    pub fn planner(&self) -> &QueryPlanner {
        &self.planner
    }

    pub fn tracker(&self) -> &Arc<ChannelStatisticsTracker> {
        &self.tracker
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub async fn resolve_access(
        &self,
        owner: &str,
        stream_name: &str,
        user: &str,
    ) -> PlannerResult<AccessDecision> {
        self.planner.resolve_access(owner, stream_name, user).await
    }

    pub async fn build_and_execute(&self, request: QueryRequest) -> PlannerResult<PlanCursor> {
        self.planner.build_and_execute(request).await
    }

    /// Reads every result row; a denied request reads as no rows
    pub async fn read(&self, request: QueryRequest) -> PlannerResult<Vec<Tuple>> {
        match self.planner.build_and_execute(request).await {
            Ok(cursor) => cursor.collect_all().await,
            Err(err) if err.is_access_denied() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    pub async fn explain(&self, request: QueryRequest) -> ExplainPlan {
        self.planner.explain(request).await
    }

    /// Widens the statistics of `stream` with one tuple's values
    pub fn track_ingest(&self, stream: &Stream, values: &[Value]) -> StatsResult<usize> {
        self.tracker.track_ingest(stream, values)
    }

    pub fn parse_aggregate_expr(&self, text: &str) -> AggregateResult<AggregateSpec> {
        parse_aggregate_expr(text)
    }

    /// Stores and tracks one tuple
    pub async fn append_tuple(
        &self,
        owner: &str,
        stream_name: &str,
        timestamp: chrono::DateTime<chrono::Utc>,
        values: Vec<Value>,
    ) -> IngestResult<()> {
        let stream = self.stream(owner, stream_name).await?;
        let tuples = conform(&stream, vec![(timestamp, values)])?;
        for tuple in tuples {
            self.guarded(self.store.append_tuple(stream.id, tuple.clone()))
                .await?;
            self.tracker.track_ingest(&stream, &tuple.values)?;
        }
        self.ingested(&stream, 1);
        Ok(())
    }

    /// Stores JSON-encoded tuples, all or none
    pub async fn ingest_json(&self, owner: &str, stream_name: &str, body: &str) -> IngestResult<u64> {
        let raw = parse_json_tuples(body)?;
        self.load(owner, stream_name, raw).await
    }

    /// Stores CSV rows, all or none
    pub async fn bulk_load_csv(&self, owner: &str, stream_name: &str, text: &str) -> IngestResult<u64> {
        let raw = parse_csv(text)?;
        self.load(owner, stream_name, raw).await
    }

    /// Deletes a stream's rows in `window`; statistics keep their bounds
    pub async fn delete_range(
        &self,
        owner: &str,
        stream_name: &str,
        window: &TimeWindow,
    ) -> IngestResult<u64> {
        let stream = self.stream(owner, stream_name).await?;
        let removed = self
            .guarded(self.store.delete_range(stream.id, window))
            .await?;
        log_event_with_fields(
            Event::TuplesDeleted,
            &[
                ("stream", &format!("{}/{}", stream.owner, stream.name)),
                ("count", &removed.to_string()),
            ],
        );
        Ok(removed)
    }

    async fn load(&self, owner: &str, stream_name: &str, raw: Vec<RawTuple>) -> IngestResult<u64> {
        let stream = self.stream(owner, stream_name).await?;
        let tuples = conform(&stream, raw)?;
        let count = self
            .guarded(self.store.bulk_load(&ViewRef::Stream(stream.id), tuples.clone()))
            .await?;
        for tuple in &tuples {
            self.tracker.track_ingest(&stream, &tuple.values)?;
        }
        self.ingested(&stream, count);
        Ok(count)
    }

    async fn stream(&self, owner: &str, name: &str) -> IngestResult<Stream> {
        self.catalog
            .stream(owner, name)
            .await?
            .ok_or_else(|| IngestError::StreamNotFound {
                owner: owner.to_string(),
                name: name.to_string(),
            })
    }

    async fn guarded<T, F>(&self, call: F) -> IngestResult<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(IngestError::Timeout),
        }
    }

    fn ingested(&self, stream: &Stream, count: u64) {
        self.metrics.add_tuples_ingested(count);
        log_event_with_fields(
            Event::TuplesIngested,
            &[
                ("stream", &format!("{}/{}", stream.owner, stream.name)),
                ("count", &count.to_string()),
            ],
        );
    }
}

fn conform(stream: &Stream, raw: Vec<RawTuple>) -> IngestResult<Vec<Tuple>> {
    raw.into_iter()
        .enumerate()
        .map(|(i, (timestamp, values))| {
            conform_values(&stream.channels, values)
                .map(|values| Tuple::new(timestamp, values))
                .map_err(|source| IngestError::Conform { row: i + 1, source })
        })
        .collect()
}
