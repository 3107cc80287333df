//! Gesture classification from per-sensor feature vectors.
//!
//! This module contains:
//! - A diagonal Gaussian HMM trained with Baum-Welch
//! - A per-sensor ensemble holding one HMM per gesture class
//! - The fusion rule combining score lists from several sensors
//! - A four-sensor recognizer tying the pipeline together

pub mod ensemble;
pub mod fusion;
pub mod hmm;
pub mod recognizer;

use crate::core::features::FeatureVector;
use crate::error::Result;
use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use ensemble::PerSensorHmmEnsemble;
pub use fusion::{fuse, FusedDecision};
pub use hmm::{ConvergenceMonitor, GaussianHmm};
pub use recognizer::{Classification, GestureRecognizer, TrainingReport};

/// Log-likelihood of one observation under one class model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub score: f64,
    pub label: String,
}

impl ClassScore {
    pub fn new(score: f64, label: impl Into<String>) -> Self {
        Self {
            score,
            label: label.into(),
        }
    }
}

/// Label of the highest score; ties go to the earlier entry.
pub fn best_label(scores: &[ClassScore]) -> Option<&str> {
    let mut best: Option<&ClassScore> = None;
    for candidate in scores {
        match best {
            Some(current) if candidate.score <= current.score => {}
            _ => best = Some(candidate),
        }
    }
    best.map(|s| s.label.as_str())
}

/// A classifier that can be fitted on labelled feature vectors and scores
/// new ones per class.
///
/// Every score list from one fitted classifier enumerates its classes in the
/// same order.
pub trait GestureClassifier {
    fn fit(&mut self, observations: &[FeatureVector], labels: &[String]) -> Result<()>;

    fn score(&self, observations: &[FeatureVector]) -> Result<Vec<Vec<ClassScore>>>;

    fn predict(&self, observations: &[FeatureVector]) -> Result<Vec<String>> {
        Ok(self
            .score(observations)?
            .iter()
            .filter_map(|scores| best_label(scores).map(str::to_string))
            .collect())
    }

    fn is_fitted(&self) -> bool;

    /// Class labels in enumeration order; empty before fitting.
    fn classes(&self) -> Vec<String>;
}
