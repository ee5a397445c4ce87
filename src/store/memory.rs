use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::aggregate::{BoundAggregate, Calendar};
use crate::model::{ChannelType, Stream, StreamId, TimeWindow, Tuple, Value, ViewSchema};
use crate::predicate::Predicate;

use super::contract::{ScanSpec, TimeSeriesStore, ViewHandle, ViewRef};
use super::errors::{StoreError, StoreOp, StoreResult};

/// Rows kept in timestamp order, ties in arrival order
#[derive(Debug, Clone, Default)]
struct Relation {
    schema: ViewSchema,
    rows: Vec<Tuple>,
}

impl Relation {
    fn new(schema: ViewSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, tuple: Tuple) {
        let pos = self.rows.partition_point(|t| t.timestamp <= tuple.timestamp);
        self.rows.insert(pos, tuple);
    }

    fn in_window<'a>(
        &'a self,
        window: &'a TimeWindow,
    ) -> impl Iterator<Item = &'a Tuple> + Clone + 'a {
        self.rows.iter().filter(move |t| window.contains(t.timestamp))
    }

    /// Most recent row at or before `ts` that also lies inside `window`
    fn as_of(&self, ts: DateTime<Utc>, window: &TimeWindow) -> Option<&Tuple> {
        let end = self.rows.partition_point(|t| t.timestamp <= ts);
        self.rows[..end]
            .last()
            .filter(|t| window.contains(t.timestamp))
    }
}

#[derive(Debug, Default)]
struct State {
    streams: HashMap<StreamId, Relation>,
    views: HashMap<String, Relation>,
}

impl State {
    fn relation(&self, source: &ViewRef) -> StoreResult<&Relation> {
        match source {
            ViewRef::Stream(id) => self.streams.get(id).ok_or(StoreError::UnknownStream(*id)),
            ViewRef::View(handle) => self
                .views
                .get(handle.name())
                .ok_or_else(|| StoreError::UnknownView(handle.name().to_string())),
        }
    }

    fn relation_mut(&mut self, target: &ViewRef) -> StoreResult<&mut Relation> {
        match target {
            ViewRef::Stream(id) => self
                .streams
                .get_mut(id)
                .ok_or(StoreError::UnknownStream(*id)),
            ViewRef::View(handle) => self
                .views
                .get_mut(handle.name())
                .ok_or_else(|| StoreError::UnknownView(handle.name().to_string())),
        }
    }
}

#[derive(Debug, Default)]
struct ViewJournal {
    created: Vec<String>,
    drop_requests: Vec<String>,
}

/// In-process [`TimeSeriesStore`]
///
/// Besides serving real queries, the store can be told to fail or stall any
/// operation, and it journals view creation and drop requests so tests can
/// check that every temporary view is released exactly once.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    failures: Mutex<HashSet<StoreOp>>,
    latencies: Mutex<HashMap<StoreOp, Duration>>,
    journal: Mutex<ViewJournal>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `op` fail with [`StoreError::Injected`]
    pub fn fail_on(&self, op: StoreOp) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(op);
        }
    }

    pub fn heal(&self, op: StoreOp) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(&op);
        }
    }

    /// Delays every later call of `op` before it runs
    pub fn set_latency(&self, op: StoreOp, delay: Duration) {
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.insert(op, delay);
        }
    }

    /// Names of all views created so far, in creation order
    pub fn created_views(&self) -> Vec<String> {
        self.journal
            .lock()
            .map(|j| j.created.clone())
            .unwrap_or_default()
    }

    /// Names passed to `drop_view`, including failed and repeated requests
    pub fn drop_requests(&self) -> Vec<String> {
        self.journal
            .lock()
            .map(|j| j.drop_requests.clone())
            .unwrap_or_default()
    }

    /// Names of views that currently exist
    pub fn live_views(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .map(|s| s.views.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Column layout of a stream or view
    pub fn schema_of(&self, source: &ViewRef) -> StoreResult<ViewSchema> {
        Ok(self.read()?.relation(source)?.schema.clone())
    }

    async fn enter(&self, op: StoreOp) -> StoreResult<()> {
        let delay = self
            .latencies
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .get(&op)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failures
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .contains(&op)
        {
            return Err(StoreError::Injected(op));
        }
        Ok(())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }

    fn register_view(&self, prefix: &str, relation: Relation) -> StoreResult<ViewHandle> {
        let handle = ViewHandle::new(prefix);
        self.write()?
            .views
            .insert(handle.name().to_string(), relation);
        self.journal
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .created
            .push(handle.name().to_string());
        Ok(handle)
    }

    fn scan(&self, source: &ViewRef, scan: &ScanSpec) -> StoreResult<(ViewSchema, Vec<Tuple>)> {
        let state = self.read()?;
        let relation = state.relation(source)?;
        let predicate = scan
            .predicate
            .as_deref()
            .map(|text| Predicate::compile(text, &relation.schema))
            .transpose()?;
        let width = scan
            .width
            .unwrap_or(relation.schema.width())
            .min(relation.schema.width());

        let rows = relation
            .in_window(&scan.window)
            .filter(|t| predicate.as_ref().map_or(true, |p| p.matches(t)))
            .skip(scan.offset)
            .take(scan.limit.unwrap_or(usize::MAX))
            .map(|t| t.clone().project(width))
            .collect();
        Ok((relation.schema.prefix(width), rows))
    }

    fn aggregate_rows<'a>(
        aggregate: &BoundAggregate,
        timestamp: DateTime<Utc>,
        rows: impl Iterator<Item = &'a Tuple> + Clone,
    ) -> Tuple {
        let values = aggregate
            .terms
            .iter()
            .map(|term| {
                let samples: Vec<f64> = rows
                    .clone()
                    .filter_map(|t| t.value(term.ordinal).as_f64())
                    .collect();
                term.function
                    .evaluate(&samples)
                    .map(Value::Float)
                    .unwrap_or(Value::Null)
            })
            .collect();
        Tuple::new(timestamp, values)
    }
}

fn check_width(schema: &ViewSchema, rows: &[Tuple]) -> StoreResult<()> {
    match rows.iter().find(|t| t.values.len() != schema.width()) {
        Some(bad) => Err(StoreError::SchemaMismatch {
            expected: schema.width(),
            actual: bad.values.len(),
        }),
        None => Ok(()),
    }
}

#[async_trait]
impl TimeSeriesStore for MemoryStore {
    async fn create_stream(&self, stream: &Stream) -> StoreResult<()> {
        self.enter(StoreOp::CreateStream).await?;
        let mut state = self.write()?;
        if state.streams.contains_key(&stream.id) {
            return Err(StoreError::DuplicateStream(stream.id));
        }
        state
            .streams
            .insert(stream.id, Relation::new(stream.schema()));
        Ok(())
    }

    async fn append_tuple(&self, stream: StreamId, tuple: Tuple) -> StoreResult<()> {
        self.enter(StoreOp::AppendTuple).await?;
        let mut state = self.write()?;
        let relation = state.relation_mut(&ViewRef::Stream(stream))?;
        check_width(&relation.schema, std::slice::from_ref(&tuple))?;
        relation.push(tuple);
        Ok(())
    }

    async fn bulk_load(&self, target: &ViewRef, rows: Vec<Tuple>) -> StoreResult<u64> {
        self.enter(StoreOp::BulkLoad).await?;
        let mut state = self.write()?;
        let relation = state.relation_mut(target)?;
        check_width(&relation.schema, &rows)?;
        let count = rows.len() as u64;
        relation.rows.extend(rows);
        relation.rows.sort_by_key(|t| t.timestamp);
        Ok(count)
    }

    async fn delete_range(&self, stream: StreamId, window: &TimeWindow) -> StoreResult<u64> {
        self.enter(StoreOp::DeleteRange).await?;
        let mut state = self.write()?;
        let relation = state.relation_mut(&ViewRef::Stream(stream))?;
        let before = relation.rows.len();
        relation.rows.retain(|t| !window.contains(t.timestamp));
        Ok((before - relation.rows.len()) as u64)
    }

    async fn range_scan(&self, source: &ViewRef, scan: &ScanSpec) -> StoreResult<Vec<Tuple>> {
        self.enter(StoreOp::RangeScan).await?;
        Ok(self.scan(source, scan)?.1)
    }

    async fn count_in_range(&self, source: &ViewRef, window: &TimeWindow) -> StoreResult<u64> {
        self.enter(StoreOp::CountInRange).await?;
        let state = self.read()?;
        Ok(state.relation(source)?.in_window(window).count() as u64)
    }

    async fn create_temp_view(&self, schema: ViewSchema) -> StoreResult<ViewHandle> {
        self.enter(StoreOp::CreateTempView).await?;
        self.register_view("vtable", Relation::new(schema))
    }

    async fn materialize(&self, source: &ViewRef, scan: &ScanSpec) -> StoreResult<ViewHandle> {
        self.enter(StoreOp::Materialize).await?;
        let (schema, rows) = self.scan(source, scan)?;
        self.register_view("filtered", Relation { schema, rows })
    }

    async fn drop_view(&self, handle: &ViewHandle) -> StoreResult<()> {
        self.journal
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .drop_requests
            .push(handle.name().to_string());
        self.enter(StoreOp::DropView).await?;
        self.write()?
            .views
            .remove(handle.name())
            .map(|_| ())
            .ok_or_else(|| StoreError::UnknownView(handle.name().to_string()))
    }

    async fn aggregate_by_calendar(
        &self,
        source: &ViewRef,
        aggregate: &BoundAggregate,
        calendar: Calendar,
        window: &TimeWindow,
    ) -> StoreResult<ViewHandle> {
        self.enter(StoreOp::AggregateByCalendar).await?;
        let rows = {
            let state = self.read()?;
            let relation = state.relation(source)?;
            let mut buckets: BTreeMap<DateTime<Utc>, Vec<&Tuple>> = BTreeMap::new();
            for tuple in relation.in_window(window) {
                buckets
                    .entry(calendar.bucket_start(tuple.timestamp))
                    .or_default()
                    .push(tuple);
            }
            buckets
                .into_iter()
                .map(|(start, members)| {
                    Self::aggregate_rows(aggregate, start, members.iter().copied())
                })
                .collect()
        };
        self.register_view(
            "aggregated",
            Relation {
                schema: aggregate.output_schema(),
                rows,
            },
        )
    }

    async fn aggregate_range(
        &self,
        source: &ViewRef,
        aggregate: &BoundAggregate,
        window: &TimeWindow,
    ) -> StoreResult<ViewHandle> {
        self.enter(StoreOp::AggregateRange).await?;
        let rows = {
            let state = self.read()?;
            let relation = state.relation(source)?;
            let first = relation.in_window(window).next().map(|t| t.timestamp);
            match first {
                Some(first) => {
                    let stamp = window.start.unwrap_or(first);
                    vec![Self::aggregate_rows(
                        aggregate,
                        stamp,
                        relation.in_window(window),
                    )]
                }
                None => Vec::new(),
            }
        };
        self.register_view(
            "aggregated",
            Relation {
                schema: aggregate.output_schema(),
                rows,
            },
        )
    }

    async fn union_align(&self, streams: &[StreamId], window: &TimeWindow) -> StoreResult<ViewHandle> {
        self.enter(StoreOp::UnionAlign).await?;
        let (schema, rows) = {
            let state = self.read()?;
            let relations = streams
                .iter()
                .map(|id| state.relation(&ViewRef::Stream(*id)))
                .collect::<StoreResult<Vec<_>>>()?;
            let (primary, others) = relations
                .split_first()
                .ok_or_else(|| StoreError::Backend("union_align needs at least one stream".into()))?;

            let types: Vec<ChannelType> = relations
                .iter()
                .flat_map(|r| r.schema.columns.iter().map(|c| c.channel_type))
                .collect();

            let rows: Vec<Tuple> = primary
                .in_window(window)
                .map(|anchor| {
                    let mut values = anchor.values.clone();
                    for other in others {
                        match other.as_of(anchor.timestamp, window) {
                            Some(row) => values.extend(row.values.iter().cloned()),
                            None => values
                                .extend(std::iter::repeat(Value::Null).take(other.schema.width())),
                        }
                    }
                    Tuple::new(anchor.timestamp, values)
                })
                .collect();
            (ViewSchema::synthetic(&types), rows)
        };
        self.register_view("correlated", Relation { schema, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateExpr;
    use crate::model::Channel;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2013, 3, 4, h, m, 0).unwrap()
    }

    fn stream(id: u64, name: &str, channels: &[(&str, ChannelType)]) -> Stream {
        Stream {
            id: StreamId::new(id),
            owner: "alice".into(),
            name: name.into(),
            channels: channels
                .iter()
                .map(|(n, t)| Channel::new(*n, *t))
                .collect(),
            tags: vec![],
        }
    }

    async fn seeded() -> (MemoryStore, Stream) {
        let store = MemoryStore::new();
        let env = stream(1, "env", &[("temp", ChannelType::Float), ("steps", ChannelType::Int)]);
        store.create_stream(&env).await.unwrap();
        for (i, temp) in [20.0, 22.0, 30.0, 25.0].iter().enumerate() {
            store
                .append_tuple(
                    env.id,
                    Tuple::new(at(10, i as u32 * 15), vec![Value::Float(*temp), Value::Int(i as i64)]),
                )
                .await
                .unwrap();
        }
        (store, env)
    }

    #[tokio::test]
    async fn test_range_scan_filters_and_pages() {
        let (store, env) = seeded().await;
        let scan = ScanSpec::new(TimeWindow::unbounded())
            .with_predicate(Some("temp > 21".into()))
            .with_page(1, Some(1));
        let rows = store.range_scan(&ViewRef::Stream(env.id), &scan).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values[0], Value::Float(30.0));
    }

    #[tokio::test]
    async fn test_append_keeps_timestamp_order() {
        let (store, env) = seeded().await;
        store
            .append_tuple(env.id, Tuple::new(at(9, 0), vec![Value::Float(1.0), Value::Int(9)]))
            .await
            .unwrap();
        let rows = store
            .range_scan(&ViewRef::Stream(env.id), &ScanSpec::default())
            .await
            .unwrap();
        assert_eq!(rows[0].timestamp, at(9, 0));
        assert!(rows.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_width_mismatch_rejected() {
        let (store, env) = seeded().await;
        let err = store
            .append_tuple(env.id, Tuple::new(at(9, 0), vec![Value::Float(1.0)]))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::SchemaMismatch { expected: 2, actual: 1 });
    }

    #[tokio::test]
    async fn test_materialize_projects_width() {
        let (store, env) = seeded().await;
        let handle = store
            .materialize(&ViewRef::Stream(env.id), &ScanSpec::default().with_width(1))
            .await
            .unwrap();
        let schema = store.schema_of(&ViewRef::from(&handle)).unwrap();
        assert_eq!(schema.names(), vec!["temp".to_string()]);
        store.drop_view(&handle).await.unwrap();
        assert!(store.live_views().is_empty());
        assert_eq!(store.created_views(), store.drop_requests());
    }

    #[tokio::test]
    async fn test_aggregate_by_calendar_buckets() {
        let (store, env) = seeded().await;
        let bound = AggregateExpr::parse("avg($temp), max($temp)")
            .unwrap()
            .bind(&env)
            .unwrap();
        let handle = store
            .aggregate_by_calendar(&ViewRef::Stream(env.id), &bound, Calendar::ThirtyMinutes, &TimeWindow::unbounded())
            .await
            .unwrap();
        let rows = store
            .range_scan(&ViewRef::from(&handle), &ScanSpec::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, at(10, 0));
        assert_eq!(rows[0].values, vec![Value::Float(21.0), Value::Float(22.0)]);
        assert_eq!(rows[1].timestamp, at(10, 30));
        assert_eq!(rows[1].values, vec![Value::Float(27.5), Value::Float(30.0)]);
    }

    #[tokio::test]
    async fn test_aggregate_range_empty_source_has_no_row() {
        let (store, env) = seeded().await;
        let bound = AggregateExpr::parse("sum($temp)").unwrap().bind(&env).unwrap();
        let window = TimeWindow::between(at(12, 0), at(13, 0)).unwrap();
        let handle = store
            .aggregate_range(&ViewRef::Stream(env.id), &bound, &window)
            .await
            .unwrap();
        assert_eq!(store.count_in_range(&ViewRef::from(&handle), &TimeWindow::unbounded()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_aggregate_range_single_row_at_window_start() {
        let (store, env) = seeded().await;
        let bound = AggregateExpr::parse("sum($temp), min($steps)")
            .unwrap()
            .bind(&env)
            .unwrap();
        let window = TimeWindow::between(at(9, 0), at(11, 0)).unwrap();
        let handle = store
            .aggregate_range(&ViewRef::Stream(env.id), &bound, &window)
            .await
            .unwrap();
        let rows = store
            .range_scan(&ViewRef::from(&handle), &ScanSpec::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp, at(9, 0));
        assert_eq!(rows[0].values, vec![Value::Float(97.0), Value::Float(0.0)]);

        let open_start = TimeWindow::new(None, Some(at(11, 0))).unwrap();
        let handle = store
            .aggregate_range(&ViewRef::Stream(env.id), &bound, &open_start)
            .await
            .unwrap();
        let rows = store
            .range_scan(&ViewRef::from(&handle), &ScanSpec::default())
            .await
            .unwrap();
        assert_eq!(rows[0].timestamp, at(10, 0));
    }

    #[tokio::test]
    async fn test_union_align_carries_forward() {
        let (store, env) = seeded().await;
        let door = stream(2, "door", &[("open", ChannelType::Int)]);
        store.create_stream(&door).await.unwrap();
        store
            .append_tuple(door.id, Tuple::new(at(10, 10), vec![Value::Int(1)]))
            .await
            .unwrap();

        let handle = store
            .union_align(&[env.id, door.id], &TimeWindow::unbounded())
            .await
            .unwrap();
        let schema = store.schema_of(&ViewRef::from(&handle)).unwrap();
        assert_eq!(schema.names(), vec!["channel1", "channel2", "channel3"]);

        let rows = store
            .range_scan(&ViewRef::from(&handle), &ScanSpec::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].values[2], Value::Null);
        assert_eq!(rows[1].values[2], Value::Int(1));
        assert_eq!(rows[3].values[2], Value::Int(1));
    }

    #[tokio::test]
    async fn test_delete_range_counts_removed_rows() {
        let (store, env) = seeded().await;
        let window = TimeWindow::between(at(10, 10), at(10, 35)).unwrap();
        assert_eq!(store.delete_range(env.id, &window).await.unwrap(), 2);
        assert_eq!(
            store.count_in_range(&ViewRef::Stream(env.id), &TimeWindow::unbounded()).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_injected_failure_and_drop_journal() {
        let (store, env) = seeded().await;
        store.fail_on(StoreOp::Materialize);
        let err = store
            .materialize(&ViewRef::Stream(env.id), &ScanSpec::default())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Injected(StoreOp::Materialize));
        assert!(store.created_views().is_empty());

        store.heal(StoreOp::Materialize);
        let handle = store
            .materialize(&ViewRef::Stream(env.id), &ScanSpec::default())
            .await
            .unwrap();
        store.drop_view(&handle).await.unwrap();
        assert!(matches!(store.drop_view(&handle).await, Err(StoreError::UnknownView(_))));
        assert_eq!(store.drop_requests().len(), 2);
    }
}
