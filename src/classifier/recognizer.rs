//! Four-sensor gesture recognizer.
//!
//! Trains one classifier per classified sensor kind from a labelled batch of
//! resampled recordings, then classifies new recordings by scoring each
//! sensor's feature vector and fusing the score lists.

use crate::classifier::ensemble::PerSensorHmmEnsemble;
use crate::classifier::fusion::{fuse, FusedDecision};
use crate::classifier::{ClassScore, GestureClassifier};
use crate::config::{FrameConfig, PipelineConfig};
use crate::core::features::{prepare_batch, FeatureExtractor, SkippedRecord};
use crate::core::framing::FrameLayout;
use crate::core::resample::{resample_record, ResampledGestureRecord};
use crate::core::workers::parallel_map;
use crate::error::{PipelineError, Result};
use crate::recording::{GestureRecord, SensorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What training did for one sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorTrainingSummary {
    pub sensor: SensorKind,
    pub frame_count: usize,
    pub records_used: usize,
    pub classes: Vec<String>,
    pub skipped: Vec<SkippedRecord>,
}

/// Per-sensor summaries from one training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingReport {
    pub sensors: Vec<SensorTrainingSummary>,
}

impl TrainingReport {
    pub fn skipped(&self) -> impl Iterator<Item = &SkippedRecord> {
        self.sensors.iter().flat_map(|s| s.skipped.iter())
    }
}

/// Result of classifying one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub decision: FusedDecision,
    /// Score list of each sensor that took part, in sensor order
    pub per_sensor: Vec<(SensorKind, Vec<ClassScore>)>,
}

impl Classification {
    pub fn label(&self) -> &str {
        &self.decision.label
    }
}

/// Fitted classifiers for every classified sensor plus the framing they expect.
#[derive(Debug, Clone)]
pub struct GestureRecognizer<C = PerSensorHmmEnsemble> {
    frames: FrameConfig,
    ar_order: usize,
    grid_step_us: i64,
    classifiers: BTreeMap<SensorKind, C>,
}

impl GestureRecognizer<PerSensorHmmEnsemble> {
    /// Train one HMM ensemble per classified sensor, one worker per sensor.
    pub fn train(
        records: &[ResampledGestureRecord],
        config: &PipelineConfig,
        workers: usize,
    ) -> Result<(Self, TrainingReport)> {
        let hmm = config.hmm;
        Self::train_with(records, config, workers, |sensor| {
            PerSensorHmmEnsemble::new(sensor, hmm)
        })
    }
}

impl<C> GestureRecognizer<C>
where
    C: GestureClassifier + Send,
{
    /// Train with classifiers built by `make`.
    pub fn train_with<F>(
        records: &[ResampledGestureRecord],
        config: &PipelineConfig,
        workers: usize,
        make: F,
    ) -> Result<(Self, TrainingReport)>
    where
        F: Fn(SensorKind) -> C + Sync,
    {
        if records.is_empty() {
            return Err(PipelineError::InputValidation(
                "no recordings to train on".to_string(),
            ));
        }

        let frames = config.frames;
        let ar_order = config.ar_order;
        let results = parallel_map(&SensorKind::CLASSIFIED, workers, |&sensor| -> Result<_> {
            let mut extractor = FeatureExtractor::new(ar_order);
            let frame_count = frames.get(sensor);
            let batch = prepare_batch(&mut extractor, records, sensor, frame_count);

            let mut classifier = make(sensor);
            classifier.fit(&batch.observations, &batch.labels)?;

            let summary = SensorTrainingSummary {
                sensor,
                frame_count,
                records_used: batch.observations.len(),
                classes: classifier.classes(),
                skipped: batch.skipped,
            };
            Ok((sensor, classifier, summary))
        });

        let mut classifiers = BTreeMap::new();
        let mut report = TrainingReport::default();
        for result in results {
            let (sensor, classifier, summary) = result?;
            classifiers.insert(sensor, classifier);
            report.sensors.push(summary);
        }

        tracing::info!(
            "trained {} sensor classifiers on {} recordings",
            classifiers.len(),
            records.len()
        );

        Ok((
            Self {
                frames,
                ar_order,
                grid_step_us: config.grid_step_us,
                classifiers,
            },
            report,
        ))
    }

    pub fn frame_config(&self) -> &FrameConfig {
        &self.frames
    }

    pub fn classifier(&self, sensor: SensorKind) -> Option<&C> {
        self.classifiers.get(&sensor)
    }

    /// Classify a recording already on its uniform grid.
    pub fn classify(&self, record: &ResampledGestureRecord) -> Result<Classification> {
        let mut extractor = FeatureExtractor::new(self.ar_order);
        let mut per_sensor = Vec::with_capacity(self.classifiers.len());

        for (&sensor, classifier) in &self.classifiers {
            let frame_count = self.frames.get(sensor);
            let vector = extractor
                .extract(record, sensor, frame_count)
                .ok_or_else(|| PipelineError::DataInsufficient {
                    sensor,
                    needed: FrameLayout::min_data_length(frame_count),
                    available: record.stream(sensor).len(),
                })?;

            let scores = classifier
                .score(std::slice::from_ref(&vector))?
                .into_iter()
                .next()
                .ok_or_else(|| PipelineError::Numerical(format!("{sensor} returned no scores")))?;
            per_sensor.push((sensor, scores));
        }

        let lists: Vec<&[ClassScore]> = per_sensor.iter().map(|(_, s)| s.as_slice()).collect();
        let decision = fuse(&lists)?;
        tracing::debug!(
            "{} by {} classified as '{}'",
            record.label,
            record.performed_by,
            decision.label
        );

        Ok(Classification {
            decision,
            per_sensor,
        })
    }

    /// Resample a raw recording with the training grid step, then classify it.
    pub fn classify_raw(&self, record: &GestureRecord) -> Result<Classification> {
        let resampled = resample_record(record, self.grid_step_us)?;
        self.classify(&resampled)
    }
}
