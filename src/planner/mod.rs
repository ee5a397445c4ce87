//! Query planning
//!
//! The planner turns one read request into a [`QueryPlan`]: a staged
//! pipeline of access resolution, predicate composition, cross-stream
//! correlation, filtered materialization, aggregation and privacy noise.
//! The result is read through a [`PlanCursor`].
//!
//! # Resource model
//!
//! Each plan owns the temporary views its stages create and releases them
//! exactly once, newest first, through [`QueryPlan::close`]. The cursor
//! closes the plan when it is exhausted; stage failures close it before
//! the error propagates.
//!
//! # Errors
//!
//! Every failure is a [`PlannerError`] with an `SG_*` code. Access denial
//! has its own code so callers can render it as an empty result.

mod config;
mod cursor;
mod errors;
mod explain;
mod plan;
mod planner;
mod request;

pub use config::PlannerConfig;
pub use cursor::PlanCursor;
pub use errors::{PlannerError, PlannerErrorCode, PlannerResult, Severity};
pub use explain::ExplainPlan;
pub use plan::{AccessSummary, AggregateSummary, Materialization, PlanState, QueryPlan, Stage};
pub use planner::QueryPlanner;
pub use request::QueryRequest;
