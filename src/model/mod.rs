//! Domain model for sensorgate
//!
//! Streams are named, owner-scoped time series with a fixed list of typed
//! channels. Tuples are timestamped rows of channel values. Rules are the
//! owner-authored access policies that the resolver folds into predicates.
//!
//! Everything here is plain data: no I/O, no locking.

mod rule;
mod stream;
mod time;
mod tuple;

pub use rule::{Macro, Rule, RuleAction};
pub use stream::{Channel, ChannelType, Stream, StreamId, ViewSchema};
pub(crate) use stream::synthetic_name;
pub use time::{parse_timestamp, TimeWindow, WindowViolation};
pub use tuple::{conform_values, ConformError, Tuple, Value};
