//! Explain output
//!
//! Deterministic JSON summary of what a plan did: access outcome, the
//! predicate still applied at read time, correlation members, aggregation,
//! and every view materialized along the way.

use serde::Serialize;

use crate::model::TimeWindow;

use super::errors::PlannerError;
use super::plan::{AccessSummary, AggregateSummary, Materialization, PlanState, QueryPlan};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainPlan {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_window: Option<TimeWindow>,
    /// Window applied by the final read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_window: Option<TimeWindow>,
    /// Predicate applied by the final read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_predicate: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub correlated_streams: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub materializations: Vec<Materialization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PlanState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl ExplainPlan {
    /// Creates an explain plan from a built query plan
    pub fn from_plan(plan: &QueryPlan) -> Self {
        Self {
            accepted: true,
            request_id: Some(plan.request_id().to_string()),
            stream: Some(format!("{}/{}", plan.stream().owner, plan.stream().name)),
            access: Some(plan.access.clone()),
            requested_window: Some(plan.request().window),
            read_window: Some(*plan.window()),
            read_predicate: plan.predicate().map(str::to_string),
            correlated_streams: plan.correlated.clone(),
            aggregate: plan.aggregate.clone(),
            materializations: plan.materializations().to_vec(),
            source: Some(plan.source().describe()),
            state: Some(plan.state()),
            rejection_code: None,
            rejection_reason: None,
        }
    }

    /// Creates an explain plan from a planning error
    pub fn from_error(err: &PlannerError) -> Self {
        Self {
            accepted: false,
            request_id: None,
            stream: None,
            access: None,
            requested_window: None,
            read_window: None,
            read_predicate: None,
            correlated_streams: Vec::new(),
            aggregate: None,
            materializations: Vec::new(),
            source: None,
            state: None,
            rejection_code: Some(err.code().code().to_string()),
            rejection_reason: Some(err.message().to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_error() {
        let explain = ExplainPlan::from_error(&PlannerError::window_required("no window"));
        let json = explain.to_json();
        assert_eq!(json["accepted"], false);
        assert_eq!(json["rejection_code"], "SG_WINDOW_REQUIRED");
        assert!(json.get("materializations").is_none());
    }
}
