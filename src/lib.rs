//! sensorgate - policy-resolving, privacy-preserving sensor queries
//!
//! A read request for an owner's sensor stream is compiled into a staged
//! plan over a time-series store:
//!
//! - the owner's access rules are resolved into a row predicate, a denial,
//!   or a forced aggregation
//! - `stream.channel` references in the predicate pull other streams into
//!   a time-aligned union
//! - aggregate expressions become calendar-bucketed or whole-window
//!   aggregations
//! - noisy aggregates get Laplace noise calibrated from channel statistics
//!
//! Every intermediate view a plan creates is released when the plan closes.

pub mod aggregate;
pub mod cli;
pub mod correlate;
pub mod gateway;
pub mod model;
pub mod observability;
pub mod planner;
pub mod policy;
pub mod predicate;
pub mod privacy;
pub mod stats;
pub mod store;
