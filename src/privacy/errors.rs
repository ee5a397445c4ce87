use thiserror::Error;

pub type NoiseResult<T> = Result<T, NoiseError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NoiseError {
    #[error("no noise calibration for aggregate '{0}'")]
    UnknownAggregateKind(String),

    /// Zero-width range, or a precision that is zero or not finite
    #[error("sensitivity range [{min}, {max}] cannot calibrate '{aggregate}' noise")]
    DegenerateSensitivity { aggregate: String, min: f64, max: f64 },

    #[error("epsilon must be finite and positive, got {0}")]
    InvalidEpsilon(f64),

    #[error("avg noise needs a positive sample count")]
    InvalidSampleCount,
}
