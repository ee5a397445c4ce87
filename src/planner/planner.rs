//! Staged query planning
//!
//! Stages run in a fixed order and each only when its input is present:
//!
//! 1. access: resolve the owner's rules unless the owner is reading
//! 2. compose: caller filter AND rule predicate AND override condition,
//!    after macro, time-filter and operator normalization
//! 3. correlate: merge streams named as `stream.channel`
//! 4. filter: materialize matching rows when an aggregate follows
//! 5. aggregate: calendar buckets or one row over the window
//! 6. noise: Laplace noise per aggregated value into a fresh view
//!
//! The cursor then reads the final relation. Views created by stages 3-6
//! belong to the [`QueryPlan`]; any stage failure closes the plan before
//! the error is returned.

use std::sync::Arc;

use crate::aggregate::{AggregateFunction, AggregateKind, AggregateSpec, BoundAggregate, Calendar};
use crate::correlate::{CrossStreamCorrelator, ReferenceScanner};
use crate::model::{Macro, TimeWindow, Tuple, Value};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, ObservationScope};
use crate::policy::{AccessDecision, Resolution, RuleResolver};
use crate::predicate::{and_all, normalize, parse};
use crate::privacy::{PrivacyNoiseEngine, SensitivityRange};
use crate::stats::ChannelStatisticsTracker;
use crate::store::{MetadataCatalog, ScanSpec, TimeSeriesStore, ViewRef};

use super::config::PlannerConfig;
use super::cursor::PlanCursor;
use super::errors::{PlannerError, PlannerResult};
use super::explain::ExplainPlan;
use super::plan::{guarded, AccessSummary, AggregateSummary, QueryPlan, Stage};
use super::request::QueryRequest;

/// Aggregation chosen for a plan and where it came from
struct ChosenAggregate {
    spec: AggregateSpec,
    override_rule: Option<u64>,
}

pub struct QueryPlanner {
    store: Arc<dyn TimeSeriesStore>,
    catalog: Arc<dyn MetadataCatalog>,
    tracker: Arc<ChannelStatisticsTracker>,
    resolver: RuleResolver,
    correlator: CrossStreamCorrelator,
    noise: PrivacyNoiseEngine,
    config: PlannerConfig,
    metrics: Arc<MetricsRegistry>,
}

impl QueryPlanner {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        catalog: Arc<dyn MetadataCatalog>,
        tracker: Arc<ChannelStatisticsTracker>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            correlator: CrossStreamCorrelator::new(config.max_window()),
            store,
            catalog,
            tracker,
            resolver: RuleResolver::new(),
            noise: PrivacyNoiseEngine::new(),
            config,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replaces the `stream.channel` reference scanner
    pub fn with_scanner(mut self, scanner: Arc<dyn ReferenceScanner>) -> Self {
        self.correlator = CrossStreamCorrelator::with_scanner(scanner, self.config.max_window());
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Access decision for `user` reading `owner`'s stream `stream_name`
    pub async fn resolve_access(
        &self,
        owner: &str,
        stream_name: &str,
        user: &str,
    ) -> PlannerResult<AccessDecision> {
        if user == owner {
            return Ok(AccessDecision::unrestricted());
        }
        let rules = self.catalog.rules(owner).await?;
        let decision = self.resolver.resolve(owner, stream_name, user, &rules);
        let outcome = match &decision.resolution {
            Resolution::Unrestricted => "unrestricted",
            Resolution::Allow(_) => "allow",
            Resolution::Deny => "deny",
        };
        let override_rule = decision
            .aggregate_override
            .as_ref()
            .map(|o| o.rule_id.to_string())
            .unwrap_or_default();
        log_event_with_fields(
            Event::AccessResolved,
            &[
                ("owner", owner),
                ("stream", stream_name),
                ("user", user),
                ("resolution", outcome),
                ("override_rule", &override_rule),
            ],
        );
        Ok(decision)
    }

    /// Builds the plan and opens a cursor over its result
    pub async fn build_and_execute(&self, request: QueryRequest) -> PlannerResult<PlanCursor> {
        let mut plan = self.build(request).await?;
        let scan = ScanSpec::new(*plan.window())
            .with_predicate(plan.predicate().map(str::to_string))
            .with_width(plan.output_schema().width())
            .with_page(
                plan.request().offset,
                self.config.effective_limit(plan.request().limit),
            );
        plan.begin_execution();
        self.metrics.increment_plans_executed();
        Ok(PlanCursor::new(plan, scan))
    }

    /// Builds the plan, renders it, and releases it
    pub async fn explain(&self, request: QueryRequest) -> ExplainPlan {
        match self.build(request).await {
            Ok(mut plan) => {
                let explain = ExplainPlan::from_plan(&plan);
                match plan.close().await {
                    Ok(()) => explain,
                    Err(err) => ExplainPlan::from_error(&err),
                }
            }
            Err(err) => ExplainPlan::from_error(&err),
        }
    }

    /// Runs every stage up to, but not including, the final read
    pub async fn build(&self, request: QueryRequest) -> PlannerResult<QueryPlan> {
        let scope = ObservationScope::with_fields(
            "QUERY_PLAN",
            vec![
                ("stream", format!("{}/{}", request.stream_owner, request.stream_name)),
                ("user", request.requesting_user.clone()),
            ],
        );

        match self.prepare(request).await {
            Ok(plan) => {
                let views = plan.materializations().len().to_string();
                let request_id = plan.request_id().to_string();
                log_event_with_fields(
                    Event::PlanBuilt,
                    &[
                        ("request_id", &request_id),
                        ("source", &plan.source().describe()),
                        ("views", &views),
                    ],
                );
                scope.complete_with_fields(&[("request_id", &request_id)]);
                Ok(plan)
            }
            Err(err) => {
                if err.is_access_denied() {
                    self.metrics.increment_plans_denied();
                } else {
                    self.metrics.increment_plans_failed();
                    log_event_with_fields(
                        Event::PlanFailed,
                        &[("code", err.code().code()), ("reason", err.message())],
                    );
                }
                scope.fail(err.code().code());
                Err(err)
            }
        }
    }

    async fn prepare(&self, request: QueryRequest) -> PlannerResult<QueryPlan> {
        request.window.validate()?;

        let stream = self
            .catalog
            .stream(&request.stream_owner, &request.stream_name)
            .await?
            .ok_or_else(|| {
                PlannerError::stream_not_found(&request.stream_owner, &request.stream_name)
            })?;

        let (access, decision) = if request.is_owner_read() {
            (AccessSummary::Owner, AccessDecision::unrestricted())
        } else {
            let decision = self
                .resolve_access(&stream.owner, &stream.name, &request.requesting_user)
                .await?;
            let access = match decision.resolution {
                Resolution::Allow(_) => AccessSummary::Restricted,
                _ => AccessSummary::Unrestricted,
            };
            (access, decision)
        };

        if decision.is_denied() {
            log_event_with_fields(
                Event::AccessDenied,
                &[
                    ("owner", &stream.owner),
                    ("stream", &stream.name),
                    ("user", &request.requesting_user),
                ],
            );
            return Err(PlannerError::access_denied(
                &request.requesting_user,
                &stream.owner,
                &stream.name,
            ));
        }

        let macros = self.catalog.macros(&stream.owner).await?;
        let predicate = compose_predicate(&request, &decision, &macros)?;

        let aggregate = match &decision.aggregate_override {
            Some(forced) => Some(ChosenAggregate {
                spec: forced.spec.clone(),
                override_rule: Some(forced.rule_id),
            }),
            None => request
                .aggregator_text()
                .map(AggregateSpec::parse)
                .transpose()?
                .map(|spec| ChosenAggregate {
                    spec,
                    override_rule: None,
                }),
        };

        let mut plan = QueryPlan::new(
            request,
            stream,
            Arc::clone(&self.store),
            Arc::clone(&self.metrics),
            self.config.store_call_timeout(),
        );
        plan.access = access;
        plan.set_predicate(predicate);

        match self.stage(&mut plan, aggregate).await {
            Ok(()) => Ok(plan),
            Err(err) => {
                // release failures are logged by close()
                let _ = plan.close().await;
                Err(err)
            }
        }
    }

    async fn stage(&self, plan: &mut QueryPlan, aggregate: Option<ChosenAggregate>) -> PlannerResult<()> {
        self.correlate(plan).await?;

        let Some(chosen) = aggregate else {
            return Ok(());
        };
        let bound = chosen.spec.terms()?.bind(plan.stream())?;
        let calendar = chosen.spec.calendar()?;

        self.filter(plan).await?;

        let pre_aggregation = plan.source().clone();
        let aggregation_window = *plan.window();
        self.aggregate(plan, &bound, calendar, &aggregation_window).await?;

        plan.aggregate = Some(AggregateSummary {
            kind: chosen.spec.kind.as_str().to_string(),
            terms: bound.terms.iter().map(|t| t.label()).collect(),
            calendar: calendar.map(|c| c.as_str().to_string()),
            epsilon: chosen.spec.epsilon,
            override_rule: chosen.override_rule,
        });

        if let (true, Some(epsilon)) = (chosen.spec.is_noisy, chosen.spec.epsilon) {
            self.add_noise(plan, &bound, calendar, &pre_aggregation, &aggregation_window, epsilon)
                .await?;
        }
        Ok(())
    }

    /// Merges streams the predicate names into one correlated view
    async fn correlate(&self, plan: &mut QueryPlan) -> PlannerResult<()> {
        let Some(predicate) = plan.predicate().map(str::to_string) else {
            return Ok(());
        };

        let names = self.correlator.referenced_streams(plan.stream(), &predicate)?;
        if names.is_empty() {
            let local = self.correlator.rewrite_local(plan.stream(), &predicate)?;
            plan.set_predicate(Some(local));
            return Ok(());
        }

        self.correlator.check_window(&plan.request().window)?;

        let mut others = Vec::with_capacity(names.len());
        for name in &names {
            let other = self
                .catalog
                .stream(&plan.stream().owner, name)
                .await?
                .ok_or_else(|| PlannerError::stream_not_found(&plan.stream().owner, name))?;
            others.push(other);
        }

        let layout = self.correlator.layout(plan.stream(), others);
        let rewritten = self.correlator.rewrite(&layout, &predicate)?;

        let window = *plan.window();
        let view = guarded(
            "union_align",
            plan.timeout(),
            self.store.union_align(&layout.stream_ids(), &window),
        )
        .await?;
        plan.register(Stage::Correlate, view);

        log_event_with_fields(
            Event::StreamsCorrelated,
            &[
                ("request_id", &plan.request_id().to_string()),
                ("streams", &layout.member_names().join(",")),
            ],
        );
        plan.correlated = names;
        plan.set_predicate(Some(rewritten));
        // the union is already restricted to the window
        plan.set_window(TimeWindow::unbounded());
        Ok(())
    }

    /// Materializes rows matching the predicate ahead of aggregation
    async fn filter(&self, plan: &mut QueryPlan) -> PlannerResult<()> {
        let Some(predicate) = plan.predicate().map(str::to_string) else {
            return Ok(());
        };
        plan.request().window.check_bound(self.config.max_window())?;

        let scan = ScanSpec::new(*plan.window())
            .with_predicate(Some(predicate))
            .with_width(plan.stream().width());
        let view = guarded(
            "materialize",
            plan.timeout(),
            self.store.materialize(plan.source(), &scan),
        )
        .await?;
        plan.register(Stage::Filter, view);
        plan.set_predicate(None);

        log_event_with_fields(
            Event::FilterMaterialized,
            &[
                ("request_id", &plan.request_id().to_string()),
                ("source", &plan.source().describe()),
            ],
        );
        Ok(())
    }

    async fn aggregate(
        &self,
        plan: &mut QueryPlan,
        bound: &BoundAggregate,
        calendar: Option<Calendar>,
        window: &TimeWindow,
    ) -> PlannerResult<()> {
        let source = plan.source().clone();
        let view = match calendar {
            Some(calendar) => {
                guarded(
                    "aggregate_by_calendar",
                    plan.timeout(),
                    self.store
                        .aggregate_by_calendar(&source, bound, calendar, window),
                )
                .await?
            }
            None => {
                guarded(
                    "aggregate_range",
                    plan.timeout(),
                    self.store.aggregate_range(&source, bound, window),
                )
                .await?
            }
        };
        plan.register(Stage::Aggregate, view);
        plan.set_output_schema(bound.output_schema());
        // bucket rows are stamped with bucket starts, which may precede the window
        plan.set_window(TimeWindow::unbounded());

        let kind = match calendar {
            Some(_) => AggregateKind::AggregateBy,
            None => AggregateKind::AggregateRange,
        };
        log_event_with_fields(
            Event::AggregationApplied,
            &[
                ("request_id", &plan.request_id().to_string()),
                ("kind", kind.as_str()),
                ("terms", &bound.terms.len().to_string()),
            ],
        );
        Ok(())
    }

    /// Copies the aggregate into a new view with noise added to each value
    async fn add_noise(
        &self,
        plan: &mut QueryPlan,
        bound: &BoundAggregate,
        calendar: Option<Calendar>,
        pre_aggregation: &ViewRef,
        window: &TimeWindow,
        epsilon: f64,
    ) -> PlannerResult<()> {
        let aggregated = plan.read(&ScanSpec::default()).await?;
        let stream_id = plan.stream().id;

        let mut ranges = Vec::with_capacity(bound.terms.len());
        for term in &bound.terms {
            let stats = self.tracker.range(stream_id, term.ordinal).ok_or_else(|| {
                PlannerError::degenerate_sensitivity(format!(
                    "no statistics recorded for channel '{}'",
                    term.channel
                ))
            })?;
            ranges.push(SensitivityRange::new(stats.min, stats.max));
        }
        let needs_count = bound
            .terms
            .iter()
            .any(|t| t.function == AggregateFunction::Avg);

        let mut noised = Vec::with_capacity(aggregated.len());
        let mut samples = 0u64;
        for row in aggregated {
            let sample_count = if needs_count {
                let bucket = match calendar {
                    Some(calendar) => TimeWindow::half_open(row.timestamp, calendar.next_bucket(row.timestamp))
                        .intersect(window),
                    None => *window,
                };
                Some(
                    guarded(
                        "count_in_range",
                        plan.timeout(),
                        self.store.count_in_range(pre_aggregation, &bucket),
                    )
                    .await?,
                )
            } else {
                None
            };

            let mut values = Vec::with_capacity(row.values.len());
            for ((term, range), value) in bound.terms.iter().zip(&ranges).zip(row.values) {
                let noisy = match value.as_f64() {
                    Some(v) => {
                        let count = if term.function == AggregateFunction::Avg {
                            sample_count
                        } else {
                            None
                        };
                        samples += 1;
                        Value::Float(v + self.noise.sample(term.function.name(), *range, epsilon, count)?)
                    }
                    None => value,
                };
                values.push(noisy);
            }
            noised.push(Tuple::new(row.timestamp, values));
        }

        let view = guarded(
            "create_temp_view",
            plan.timeout(),
            self.store.create_temp_view(bound.output_schema()),
        )
        .await?;
        plan.register(Stage::Noise, view.clone());

        guarded(
            "bulk_load",
            plan.timeout(),
            self.store.bulk_load(&ViewRef::from(&view), noised),
        )
        .await?;

        self.metrics.add_noise_samples(samples);
        plan.noise_samples = samples;
        log_event_with_fields(
            Event::NoiseApplied,
            &[
                ("request_id", &plan.request_id().to_string()),
                ("epsilon", &epsilon.to_string()),
                ("samples", &samples.to_string()),
            ],
        );
        Ok(())
    }
}

/// Caller filter AND rule predicate AND override condition, normalized
///
/// Bare identifiers must name channels of the primary stream; qualified
/// references are left for correlation.
fn compose_predicate(
    request: &QueryRequest,
    decision: &AccessDecision,
    macros: &[Macro],
) -> PlannerResult<Option<String>> {
    let override_condition = decision
        .aggregate_override
        .as_ref()
        .and_then(|o| o.condition.as_deref());

    let parts = [request.filter_text(), decision.predicate(), override_condition]
        .into_iter()
        .flatten()
        .map(|text| normalize(text, macros))
        .collect::<Result<Vec<_>, _>>()?;

    let Some(composed) = and_all(parts.iter().map(|p| Some(p.as_str()))) else {
        return Ok(None);
    };
    parse(&composed)?;
    Ok(Some(composed))
}
