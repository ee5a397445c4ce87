//! Cross-stream correlation
//!
//! A predicate may mention other streams' channels as `stream.channel`.
//! Such a predicate cannot be evaluated against one stream, so the
//! referenced streams are merged with the primary into one time-aligned
//! view and the predicate is rewritten to that view's positional column
//! names (`channel1..channelN`: primary channels first, then each
//! referenced stream's channels in discovery order).
//!
//! Finding references is delegated to a [`ReferenceScanner`]. The default
//! [`RegexReferenceScanner`] only recognizes references bounded by
//! whitespace on both sides; [`LexerReferenceScanner`] accepts any
//! reference the predicate grammar accepts.
//!
//! The correlator never talks to the store itself. It works out which
//! streams to merge and how to rename; the planner performs the union so
//! the resulting view is owned by the plan from the moment it exists.

mod correlator;
mod errors;
mod scanner;

pub use correlator::{CorrelatedLayout, CrossStreamCorrelator};
pub use errors::{CorrelateError, CorrelateResult};
pub use scanner::{LexerReferenceScanner, ReferenceScanner, RegexReferenceScanner, StreamReference};
