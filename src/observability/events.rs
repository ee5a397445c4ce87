//! Lifecycle events emitted by the query core
//!
//! Events are explicit and typed; the string form is the `event` key of the
//! emitted log line.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    ConfigLoaded,

    // Access resolution
    /// Rules folded into a decision
    AccessResolved,
    /// Request refused by policy
    AccessDenied,
    /// An unusable aggregate-override rule was ignored
    RuleSkipped,

    // Plan stages
    PlanBuilt,
    StreamsCorrelated,
    FilterMaterialized,
    AggregationApplied,
    NoiseApplied,
    PlanClosed,
    PlanFailed,

    // Materialization lifecycle
    ViewCreated,
    ViewReleased,
    /// A view could not be dropped, or no runtime was available to drop it
    ViewLeaked,

    // Ingest
    TuplesIngested,
    TuplesDeleted,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::AccessResolved => "ACCESS_RESOLVED",
            Event::AccessDenied => "ACCESS_DENIED",
            Event::RuleSkipped => "RULE_SKIPPED",

            Event::PlanBuilt => "PLAN_BUILT",
            Event::StreamsCorrelated => "PLAN_STREAMS_CORRELATED",
            Event::FilterMaterialized => "PLAN_FILTER_MATERIALIZED",
            Event::AggregationApplied => "PLAN_AGGREGATION_APPLIED",
            Event::NoiseApplied => "PLAN_NOISE_APPLIED",
            Event::PlanClosed => "PLAN_CLOSED",
            Event::PlanFailed => "PLAN_FAILED",

            Event::ViewCreated => "VIEW_CREATED",
            Event::ViewReleased => "VIEW_RELEASED",
            Event::ViewLeaked => "VIEW_LEAKED",

            Event::TuplesIngested => "TUPLES_INGESTED",
            Event::TuplesDeleted => "TUPLES_DELETED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::ViewCreated | Event::ViewReleased => Severity::Trace,
            Event::AccessDenied | Event::RuleSkipped => Severity::Warn,
            Event::PlanFailed | Event::ViewLeaked => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_screaming_snake_case() {
        let events = [
            Event::ConfigLoaded,
            Event::AccessResolved,
            Event::AccessDenied,
            Event::RuleSkipped,
            Event::PlanBuilt,
            Event::StreamsCorrelated,
            Event::FilterMaterialized,
            Event::AggregationApplied,
            Event::NoiseApplied,
            Event::PlanClosed,
            Event::PlanFailed,
            Event::ViewCreated,
            Event::ViewReleased,
            Event::ViewLeaked,
            Event::TuplesIngested,
            Event::TuplesDeleted,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'), "{}", s);
        }
    }

    #[test]
    fn test_failure_events_are_errors() {
        assert_eq!(Event::PlanFailed.severity(), Severity::Error);
        assert_eq!(Event::ViewLeaked.severity(), Severity::Error);
        assert_eq!(Event::AccessDenied.severity(), Severity::Warn);
    }
}
