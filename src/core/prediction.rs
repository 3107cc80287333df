//! JSON snapshots of classification results.
//!
//! Each snapshot describes one classified recording: who produced it, what
//! went in, the fused decision and every sensor's scores.

use crate::classifier::{ClassScore, Classification};
use crate::core::resample::ResampledGestureRecord;
use crate::recording::SensorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The current snapshot format version.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "armband-gesture";

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    /// Name of the producing software
    pub name: String,
    /// Version of the producing software
    pub version: String,
    /// Unique instance identifier (UUID)
    pub instance_id: String,
}

/// The recording a prediction was made for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    /// Who performed the gesture
    pub performed_by: String,
    /// Label attached to the recording, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// When the recording was captured (RFC3339)
    pub captured_at: String,
    /// Grid points in the resampled recording
    pub grid_len: usize,
}

/// One sensor's contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorScores {
    pub sensor: SensorKind,
    pub predicted: Option<String>,
    pub scores: Vec<ClassScore>,
}

/// A classification result ready for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSnapshot {
    pub snapshot_version: String,
    /// When this payload was computed (RFC3339)
    pub computed_at_utc: String,
    pub producer: Producer,
    pub input: PredictionInput,
    /// Fused gesture label
    pub predicted: String,
    /// Averaged per-class scores
    pub combined: Vec<ClassScore>,
    pub sensors: Vec<SensorScores>,
}

impl PredictionSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Whether the fused label agrees with the recording's own label.
    pub fn is_correct(&self) -> Option<bool> {
        self.input.label.as_ref().map(|label| *label == self.predicted)
    }
}

/// Builder for prediction snapshots.
pub struct PredictionBuilder {
    instance_id: Uuid,
}

impl PredictionBuilder {
    /// Create a new builder with a unique instance ID.
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn build(
        &self,
        record: &ResampledGestureRecord,
        classification: &Classification,
    ) -> PredictionSnapshot {
        self.build_at(record, classification, Utc::now())
    }

    fn build_at(
        &self,
        record: &ResampledGestureRecord,
        classification: &Classification,
        computed_at: DateTime<Utc>,
    ) -> PredictionSnapshot {
        let sensors = classification
            .per_sensor
            .iter()
            .map(|(sensor, scores)| SensorScores {
                sensor: *sensor,
                predicted: crate::classifier::best_label(scores).map(str::to_string),
                scores: scores.clone(),
            })
            .collect();

        PredictionSnapshot {
            snapshot_version: SNAPSHOT_VERSION.to_string(),
            computed_at_utc: computed_at.to_rfc3339(),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                instance_id: self.instance_id.to_string(),
            },
            input: PredictionInput {
                performed_by: record.performed_by.clone(),
                label: (!record.label.is_empty()).then(|| record.label.clone()),
                captured_at: record.captured_at.to_rfc3339(),
                grid_len: record.grid_len(),
            },
            predicted: classification.decision.label.clone(),
            combined: classification.decision.combined.clone(),
            sensors,
        }
    }
}

impl Default for PredictionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
