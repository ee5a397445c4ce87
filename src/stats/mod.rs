//! Per-channel value bounds
//!
//! The tracker remembers, for every numeric channel of every stream, the
//! smallest and largest value ever ingested. Noise calibration reads these
//! bounds as the sensitivity range of an aggregate.
//!
//! Bounds only widen. Deleting tuples from the store does not shrink them:
//! the bound describes what the data *could* have been, not what it is now.

mod errors;
mod tracker;

pub use errors::{StatsError, StatsResult};
pub use tracker::{ChannelStatistics, ChannelStatisticsTracker};
