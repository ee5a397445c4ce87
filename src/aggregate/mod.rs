//! Aggregate expressions
//!
//! An aggregate expression is the `action` of an aggregate-override rule or
//! the caller's requested aggregator:
//!
//! ```text
//! AggregateBy('avg($temp), max($temp)', '1hour')
//! AggregateRange('min($level)')
//! NoisyAggregateBy('avg($temp)', '1day', 0.5)
//! NoisyAggregateRange('sum($steps)', 1.0)
//! ```
//!
//! `DownSample` and `Calculate` are accepted as aliases of `AggregateBy` and
//! `AggregateRange`. Names are case-insensitive. The noisy forms carry a
//! trailing epsilon that is split off into [`AggregateSpec::epsilon`].
//!
//! The first argument is a list of terms, `func($channel)`, with `func` one
//! of `min max median sum avg first last nth`. `nth($channel, N)` selects the
//! N-th sample (1-based) of each bucket.

mod calendar;
mod errors;
mod spec;
mod terms;

pub use calendar::Calendar;
pub use errors::{AggregateError, AggregateErrorCode, AggregateResult};
pub use spec::{is_aggregate_expression, parse_aggregate_expr, AggregateKind, AggregateSpec};
pub use terms::{AggregateExpr, AggregateFunction, AggregateTerm, BoundAggregate, BoundTerm};
