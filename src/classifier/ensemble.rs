//! One Gaussian HMM per gesture class for a single sensor.

use crate::classifier::hmm::{ConvergenceMonitor, GaussianHmm, Sequence};
use crate::classifier::{ClassScore, GestureClassifier};
use crate::config::HmmConfig;
use crate::core::features::FeatureVector;
use crate::error::{PipelineError, Result};
use crate::recording::SensorKind;
use std::collections::BTreeMap;

/// Per-class HMMs for one sensor. Classes are enumerated in sorted label order.
#[derive(Debug, Clone)]
pub struct PerSensorHmmEnsemble {
    sensor: SensorKind,
    config: HmmConfig,
    /// When set, `fit` insists on exactly this many distinct labels
    expected_classes: Option<usize>,
    models: BTreeMap<String, GaussianHmm>,
    features_per_frame: usize,
    fitted: bool,
}

impl PerSensorHmmEnsemble {
    pub fn new(sensor: SensorKind, config: HmmConfig) -> Self {
        Self {
            sensor,
            config,
            expected_classes: None,
            models: BTreeMap::new(),
            features_per_frame: 0,
            fitted: false,
        }
    }

    /// Require a fixed number of classes at fit time.
    pub fn with_expected_classes(mut self, classes: usize) -> Self {
        self.expected_classes = Some(classes);
        self
    }

    pub fn sensor(&self) -> SensorKind {
        self.sensor
    }

    pub fn config(&self) -> &HmmConfig {
        &self.config
    }

    /// Model count, one per distinct training label.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Convergence details of each class model.
    pub fn monitor(&self) -> Result<Vec<(String, ConvergenceMonitor)>> {
        if !self.fitted {
            return Err(PipelineError::ModelNotFitted);
        }
        Ok(self
            .models
            .iter()
            .map(|(label, model)| (label.clone(), model.monitor().clone()))
            .collect())
    }

    fn sequence(&self, vector: &FeatureVector) -> Result<Sequence> {
        if vector.sensor != self.sensor {
            return Err(PipelineError::InputValidation(format!(
                "{} ensemble got a {} feature vector",
                self.sensor, vector.sensor
            )));
        }
        if vector.frame_count == 0 || vector.values.len() % vector.frame_count != 0 {
            return Err(PipelineError::InputValidation(format!(
                "{} values do not split into {} frames",
                vector.values.len(),
                vector.frame_count
            )));
        }
        Ok(vector.observations().map(<[f64]>::to_vec).collect())
    }
}

impl GestureClassifier for PerSensorHmmEnsemble {
    fn fit(&mut self, observations: &[FeatureVector], labels: &[String]) -> Result<()> {
        if observations.is_empty() || labels.is_empty() {
            return Err(PipelineError::InputValidation(format!(
                "cannot fit the {} ensemble on an empty batch",
                self.sensor
            )));
        }
        if observations.len() != labels.len() {
            return Err(PipelineError::InputValidation(format!(
                "{} observations but {} labels",
                observations.len(),
                labels.len()
            )));
        }

        let mut by_label: BTreeMap<&str, Vec<Sequence>> = BTreeMap::new();
        let mut features_per_frame = None;
        for (vector, label) in observations.iter().zip(labels) {
            let width = vector.features_per_frame();
            match features_per_frame {
                None => features_per_frame = Some(width),
                Some(expected) if expected != width => {
                    return Err(PipelineError::InputValidation(format!(
                        "feature vectors mix {expected} and {width} features per frame"
                    )));
                }
                Some(_) => {}
            }
            by_label
                .entry(label.as_str())
                .or_default()
                .push(self.sequence(vector)?);
        }

        if let Some(expected) = self.expected_classes {
            if by_label.len() != expected {
                return Err(PipelineError::InputValidation(format!(
                    "expected {expected} classes, labels name {}",
                    by_label.len()
                )));
            }
        }

        let mut models = BTreeMap::new();
        for (label, sequences) in by_label {
            let mut model = GaussianHmm::new(self.config);
            model.fit(&sequences)?;
            tracing::info!(
                "fitted {} model for '{}' on {} recordings ({} EM iterations, converged: {})",
                self.sensor,
                label,
                sequences.len(),
                model.monitor().iterations,
                model.monitor().converged
            );
            models.insert(label.to_string(), model);
        }

        self.models = models;
        self.features_per_frame = features_per_frame.unwrap_or(0);
        self.fitted = true;
        Ok(())
    }

    fn score(&self, observations: &[FeatureVector]) -> Result<Vec<Vec<ClassScore>>> {
        if !self.fitted {
            return Err(PipelineError::ModelNotFitted);
        }

        observations
            .iter()
            .map(|vector| -> Result<Vec<ClassScore>> {
                if vector.features_per_frame() != self.features_per_frame {
                    return Err(PipelineError::InputValidation(format!(
                        "ensemble was fitted on {} features per frame, got {}",
                        self.features_per_frame,
                        vector.features_per_frame()
                    )));
                }
                let sequence = self.sequence(vector)?;
                self.models
                    .iter()
                    .map(|(label, model)| {
                        model
                            .score(&sequence)
                            .map(|score| ClassScore::new(score, label.clone()))
                    })
                    .collect()
            })
            .collect()
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn classes(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }
}
