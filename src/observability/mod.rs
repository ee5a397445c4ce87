//! Observability for the query core
//!
//! - Structured JSON logging with a configurable floor
//! - Typed lifecycle events
//! - Monotonic counters
//! - Scope-based begin/complete tracing
//!
//! Observability never influences a plan: nothing here returns an error.
//!
//! ```ignore
//! use sensorgate::observability::{log_event_with_fields, Event, ObservationScope};
//!
//! let scope = ObservationScope::new("QUERY_PLAN");
//! log_event_with_fields(Event::ViewCreated, &[("view", "vtable_1f0c")]);
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log a lifecycle event at its natural severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
