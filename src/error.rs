//! Error taxonomy for the alignment, feature and classification pipeline.

use crate::recording::SensorKind;
use thiserror::Error;

/// Errors raised by the core pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A stream carried no samples, so no time window can be derived.
    #[error("{0} stream has no samples")]
    EmptyStream(SensorKind),

    /// Not enough data for the requested operation (e.g. cubic interpolation).
    #[error("insufficient {sensor} data: need {needed}, have {available}")]
    DataInsufficient {
        sensor: SensorKind,
        needed: usize,
        available: usize,
    },

    /// A stream violated its shape invariant.
    #[error("invalid {sensor} stream: {reason}")]
    InvalidStream { sensor: SensorKind, reason: String },

    /// `score`, `predict` or `monitor` was called before `fit`.
    #[error("model is not fitted yet, call fit() first")]
    ModelNotFitted,

    /// Bad arguments to `fit` or the recognizer.
    #[error("input validation failed: {0}")]
    InputValidation(String),

    /// Score lists being fused do not enumerate the same classes.
    #[error("class sets differ between classifiers: expected {expected:?}, found {found:?}")]
    ClassOrderingInconsistency {
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// A numerical routine could not produce a finite result.
    #[error("numerical failure: {0}")]
    Numerical(String),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
