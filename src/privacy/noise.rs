//! Laplace noise calibrated per aggregate kind

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::errors::{NoiseError, NoiseResult};

/// Sensitivity range of the aggregated channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityRange {
    pub min: f64,
    pub max: f64,
}

impl SensitivityRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the range; bounds given in either order
    pub fn delta(&self) -> f64 {
        (self.max - self.min).abs()
    }
}

/// Calibration family of an aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseKind {
    Avg,
    Extremum,
    Median,
    Sum,
    Positional,
}

impl NoiseKind {
    /// Classifies an aggregate name by substring, first match wins
    pub fn classify(aggregate: &str) -> NoiseResult<Self> {
        let name = aggregate.to_ascii_lowercase();
        if name.contains("avg") {
            Ok(NoiseKind::Avg)
        } else if name.contains("min") || name.contains("max") {
            Ok(NoiseKind::Extremum)
        } else if name.contains("median") {
            Ok(NoiseKind::Median)
        } else if name.contains("sum") {
            Ok(NoiseKind::Sum)
        } else if name.contains("first") || name.contains("last") || name.contains("nth") {
            Ok(NoiseKind::Positional)
        } else {
            Err(NoiseError::UnknownAggregateKind(aggregate.to_string()))
        }
    }
}

/// Stateless Laplace sampler
///
/// Every call draws fresh randomness. Callers that need reproducible draws
/// pass their own generator to [`PrivacyNoiseEngine::sample_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivacyNoiseEngine;

impl PrivacyNoiseEngine {
    pub fn new() -> Self {
        Self
    }

    /// Precision λ of the Laplace distribution for one aggregate output
    pub fn precision(
        &self,
        aggregate: &str,
        range: SensitivityRange,
        epsilon: f64,
        sample_count: Option<u64>,
    ) -> NoiseResult<f64> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(NoiseError::InvalidEpsilon(epsilon));
        }

        let kind = NoiseKind::classify(aggregate)?;
        let delta = range.delta();
        let degenerate = || NoiseError::DegenerateSensitivity {
            aggregate: aggregate.to_string(),
            min: range.min,
            max: range.max,
        };

        if delta == 0.0 {
            return Err(degenerate());
        }

        let lambda = match kind {
            NoiseKind::Avg => {
                let n = sample_count
                    .filter(|n| *n > 0)
                    .ok_or(NoiseError::InvalidSampleCount)?;
                epsilon * n as f64 / delta
            }
            NoiseKind::Extremum => epsilon * delta,
            NoiseKind::Median => epsilon * 2.0 / delta,
            NoiseKind::Sum => epsilon * range.min.abs().max(range.max.abs()),
            NoiseKind::Positional => epsilon / delta,
        };

        if !lambda.is_finite() || lambda <= 0.0 {
            return Err(degenerate());
        }
        Ok(lambda)
    }

    /// One noise draw using the thread-local generator
    pub fn sample(
        &self,
        aggregate: &str,
        range: SensitivityRange,
        epsilon: f64,
        sample_count: Option<u64>,
    ) -> NoiseResult<f64> {
        self.sample_with(&mut rand::thread_rng(), aggregate, range, epsilon, sample_count)
    }

    /// One noise draw from `rng`
    ///
    /// `X = -sign(U) · (1/λ) · ln(1 - 2|U|)` with `U` uniform on (-0.5, 0.5).
    pub fn sample_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        aggregate: &str,
        range: SensitivityRange,
        epsilon: f64,
        sample_count: Option<u64>,
    ) -> NoiseResult<f64> {
        let lambda = self.precision(aggregate, range, epsilon, sample_count)?;
        Ok(laplace(rng, 1.0 / lambda))
    }
}

fn laplace<R: Rng + ?Sized>(rng: &mut R, scale: f64) -> f64 {
    // U = -0.5 would give ln(0)
    let u = loop {
        let u = rng.gen::<f64>() - 0.5;
        if u > -0.5 {
            break u;
        }
    };
    let sign = if u > 0.0 {
        1.0
    } else if u < 0.0 {
        -1.0
    } else {
        0.0
    };
    -scale * sign * (1.0 - 2.0 * u.abs()).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn range(min: f64, max: f64) -> SensitivityRange {
        SensitivityRange::new(min, max)
    }

    #[test]
    fn test_classification_order() {
        assert_eq!(NoiseKind::classify("AVG").unwrap(), NoiseKind::Avg);
        assert_eq!(NoiseKind::classify("max_temp").unwrap(), NoiseKind::Extremum);
        assert_eq!(NoiseKind::classify("median").unwrap(), NoiseKind::Median);
        assert_eq!(NoiseKind::classify("sum").unwrap(), NoiseKind::Sum);
        assert_eq!(NoiseKind::classify("nth3_x").unwrap(), NoiseKind::Positional);
        assert!(matches!(
            NoiseKind::classify("stddev"),
            Err(NoiseError::UnknownAggregateKind(_))
        ));
    }

    #[test]
    fn test_precision_formulas() {
        let e = PrivacyNoiseEngine::new();
        let r = range(-2.0, 8.0);
        assert_eq!(e.precision("avg", r, 0.5, Some(20)).unwrap(), 0.5 * 20.0 / 10.0);
        assert_eq!(e.precision("min", r, 0.5, None).unwrap(), 0.5 * 10.0);
        assert_eq!(e.precision("median", r, 0.5, None).unwrap(), 0.5 * 2.0 / 10.0);
        assert_eq!(e.precision("sum", r, 0.5, None).unwrap(), 0.5 * 8.0);
        assert_eq!(e.precision("first", r, 0.5, None).unwrap(), 0.5 / 10.0);
    }

    #[test]
    fn test_zero_range_is_degenerate() {
        let e = PrivacyNoiseEngine::new();
        for kind in ["avg", "max", "median", "last"] {
            let err = e.precision(kind, range(3.0, 3.0), 1.0, Some(4)).unwrap_err();
            assert!(matches!(err, NoiseError::DegenerateSensitivity { .. }), "{}", kind);
        }
        let err = e.precision("sum", range(0.0, 0.0), 1.0, None).unwrap_err();
        assert!(matches!(err, NoiseError::DegenerateSensitivity { .. }));
    }

    #[test]
    fn test_zero_range_sum_fails_before_drawing() {
        let e = PrivacyNoiseEngine::new();
        let err = e.sample("sum", range(5.0, 5.0), 1.0, None).unwrap_err();
        assert_eq!(
            err,
            NoiseError::DegenerateSensitivity {
                aggregate: "sum".into(),
                min: 5.0,
                max: 5.0,
            }
        );
    }

    #[test]
    fn test_reversed_range_uses_absolute_width() {
        let e = PrivacyNoiseEngine::new();
        assert_eq!(range(10.0, 0.0).delta(), 10.0);
        assert_eq!(e.precision("max", range(10.0, 0.0), 1.0, None).unwrap(), 10.0);
        assert_eq!(
            e.precision("median", range(8.0, -2.0), 0.5, None).unwrap(),
            e.precision("median", range(-2.0, 8.0), 0.5, None).unwrap()
        );
        assert!(e.sample("avg", range(4.0, 1.0), 1.0, Some(3)).unwrap().is_finite());
    }

    #[test]
    fn test_avg_requires_sample_count() {
        let e = PrivacyNoiseEngine::new();
        assert_eq!(
            e.precision("avg", range(0.0, 1.0), 1.0, None),
            Err(NoiseError::InvalidSampleCount)
        );
        assert_eq!(
            e.precision("avg", range(0.0, 1.0), 1.0, Some(0)),
            Err(NoiseError::InvalidSampleCount)
        );
    }

    #[test]
    fn test_invalid_epsilon() {
        let e = PrivacyNoiseEngine::new();
        assert!(matches!(
            e.precision("max", range(0.0, 1.0), 0.0, None),
            Err(NoiseError::InvalidEpsilon(_))
        ));
        assert!(matches!(
            e.precision("max", range(0.0, 1.0), f64::NAN, None),
            Err(NoiseError::InvalidEpsilon(_))
        ));
    }

    #[test]
    fn test_seeded_draws_are_reproducible() {
        let e = PrivacyNoiseEngine::new();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            let x = e.sample_with(&mut a, "max", range(0.0, 4.0), 1.0, None).unwrap();
            let y = e.sample_with(&mut b, "max", range(0.0, 4.0), 1.0, None).unwrap();
            assert_eq!(x, y);
            assert!(x.is_finite());
        }
    }
}
