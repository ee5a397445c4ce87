//! Differential-privacy noise for aggregate outputs
//!
//! Noise is Laplace-distributed with scale `1/λ`, where the precision `λ`
//! is derived from the aggregate kind, the privacy budget `ε`, and the
//! sensitivity range `Δ = max - min` of the aggregated channel:
//!
//! | aggregate            | λ                         |
//! |----------------------|---------------------------|
//! | avg                  | ε · n / Δ (n = sample count) |
//! | min, max             | ε · Δ                     |
//! | median               | ε · 2 / Δ                 |
//! | sum                  | ε · max(\|min\|, \|max\|) |
//! | first, last, nth     | ε / Δ                     |
//!
//! Kinds are matched by lower-cased substring in the order of the table.

mod errors;
mod noise;

pub use errors::{NoiseError, NoiseResult};
pub use noise::{NoiseKind, PrivacyNoiseEngine, SensitivityRange};
