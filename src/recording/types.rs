//! Raw recording types for one armband gesture capture.
//!
//! Each sensor is kept as a struct-of-arrays: a timestamp column and one
//! sample column per axis, with the axis set fixed by the [`SensorKind`].

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The physical sensors carried by the armband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// 3-axis accelerometer
    Accelerometer,
    /// 3-axis gyroscope
    Gyroscope,
    /// Orientation quaternion
    Orientation,
    /// Orientation as Euler angles
    OrientationEuler,
    /// 8-channel surface EMG
    Emg,
}

impl SensorKind {
    /// All sensor kinds in record order.
    pub const ALL: [SensorKind; 5] = [
        SensorKind::Accelerometer,
        SensorKind::Gyroscope,
        SensorKind::Orientation,
        SensorKind::OrientationEuler,
        SensorKind::Emg,
    ];

    /// Sensors whose timestamps define a recording's shared time base.
    pub const TIME_BEARING: [SensorKind; 4] = [
        SensorKind::Accelerometer,
        SensorKind::Emg,
        SensorKind::Gyroscope,
        SensorKind::Orientation,
    ];

    /// Sensors that get their own classifier and take part in fusion.
    pub const CLASSIFIED: [SensorKind; 4] = [
        SensorKind::Accelerometer,
        SensorKind::Gyroscope,
        SensorKind::Orientation,
        SensorKind::Emg,
    ];

    /// Axis names in column order.
    pub fn axes(&self) -> &'static [&'static str] {
        match self {
            SensorKind::Accelerometer | SensorKind::Gyroscope => &["x", "y", "z"],
            SensorKind::Orientation => &["x", "y", "z", "w"],
            SensorKind::OrientationEuler => &["roll", "pitch", "yaw"],
            SensorKind::Emg => &["1", "2", "3", "4", "5", "6", "7", "8"],
        }
    }

    /// Number of axes (channels) for this sensor.
    pub fn axis_count(&self) -> usize {
        self.axes().len()
    }

    /// Whether features come from the EMG family rather than the inertial one.
    pub fn is_emg(&self) -> bool {
        matches!(self, SensorKind::Emg)
    }

    /// File-name prefix used by the recorder.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyro",
            SensorKind::Orientation => "orientation",
            SensorKind::OrientationEuler => "orientationEuler",
            SensorKind::Emg => "emg",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::Orientation => "orientation",
            SensorKind::OrientationEuler => "orientation_euler",
            SensorKind::Emg => "emg",
        };
        f.write_str(name)
    }
}

/// One sensor's raw capture.
///
/// Timestamps are integer microseconds. They are not guaranteed to be
/// monotonic and may contain duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorStream {
    kind: SensorKind,
    timestamps: Vec<i64>,
    axes: Vec<Vec<f64>>,
}

impl SensorStream {
    /// Build a stream, checking that the axis set matches the sensor kind and
    /// that every axis is as long as the timestamp column.
    pub fn new(kind: SensorKind, timestamps: Vec<i64>, axes: Vec<Vec<f64>>) -> Result<Self> {
        if axes.len() != kind.axis_count() {
            return Err(PipelineError::InvalidStream {
                sensor: kind,
                reason: format!("expected {} axes, got {}", kind.axis_count(), axes.len()),
            });
        }
        if let Some((index, axis)) = axes
            .iter()
            .enumerate()
            .find(|(_, axis)| axis.len() != timestamps.len())
        {
            return Err(PipelineError::InvalidStream {
                sensor: kind,
                reason: format!(
                    "axis {} has {} samples but there are {} timestamps",
                    kind.axes()[index],
                    axis.len(),
                    timestamps.len()
                ),
            });
        }

        Ok(Self {
            kind,
            timestamps,
            axes,
        })
    }

    /// An empty stream for the given sensor.
    pub fn empty(kind: SensorKind) -> Self {
        Self {
            kind,
            timestamps: Vec::new(),
            axes: vec![Vec::new(); kind.axis_count()],
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn axes(&self) -> &[Vec<f64>] {
        &self.axes
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<i64> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.timestamps.last().copied()
    }
}

/// One recorded gesture performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureRecord {
    /// Gesture name (class label)
    pub label: String,
    /// Who performed the gesture
    pub performed_by: String,
    /// When the recording was made
    pub captured_at: DateTime<Utc>,
    pub accelerometer: SensorStream,
    pub gyroscope: SensorStream,
    pub orientation: SensorStream,
    pub orientation_euler: SensorStream,
    pub emg: SensorStream,
}

impl GestureRecord {
    /// Assemble a record, checking that each stream sits in its own slot.
    pub fn new(
        label: impl Into<String>,
        performed_by: impl Into<String>,
        captured_at: DateTime<Utc>,
        streams: [SensorStream; 5],
    ) -> Result<Self> {
        let [accelerometer, gyroscope, orientation, orientation_euler, emg] = streams;
        for (expected, stream) in SensorKind::ALL.iter().zip([
            &accelerometer,
            &gyroscope,
            &orientation,
            &orientation_euler,
            &emg,
        ]) {
            if stream.kind() != *expected {
                return Err(PipelineError::InvalidStream {
                    sensor: stream.kind(),
                    reason: format!("stream placed in the {expected} slot"),
                });
            }
        }

        Ok(Self {
            label: label.into(),
            performed_by: performed_by.into(),
            captured_at,
            accelerometer,
            gyroscope,
            orientation,
            orientation_euler,
            emg,
        })
    }

    /// The stream recorded by the given sensor.
    pub fn stream(&self, kind: SensorKind) -> &SensorStream {
        match kind {
            SensorKind::Accelerometer => &self.accelerometer,
            SensorKind::Gyroscope => &self.gyroscope,
            SensorKind::Orientation => &self.orientation,
            SensorKind::OrientationEuler => &self.orientation_euler,
            SensorKind::Emg => &self.emg,
        }
    }

    /// Iterate over all streams in record order.
    pub fn streams(&self) -> impl Iterator<Item = &SensorStream> {
        SensorKind::ALL.into_iter().map(move |kind| self.stream(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_sets() {
        assert_eq!(SensorKind::Accelerometer.axis_count(), 3);
        assert_eq!(SensorKind::Orientation.axis_count(), 4);
        assert_eq!(SensorKind::OrientationEuler.axes(), &["roll", "pitch", "yaw"]);
        assert_eq!(SensorKind::Emg.axis_count(), 8);
    }

    #[test]
    fn test_file_prefixes() {
        assert_eq!(SensorKind::Gyroscope.file_prefix(), "gyro");
        assert_eq!(SensorKind::OrientationEuler.file_prefix(), "orientationEuler");
    }

    #[test]
    fn test_stream_rejects_wrong_axis_count() {
        let result = SensorStream::new(SensorKind::Accelerometer, vec![0, 1], vec![vec![0.0; 2]; 4]);
        assert!(matches!(result, Err(PipelineError::InvalidStream { .. })));
    }

    #[test]
    fn test_stream_rejects_ragged_axes() {
        let axes = vec![vec![0.0, 1.0], vec![0.0], vec![0.0, 1.0]];
        let result = SensorStream::new(SensorKind::Gyroscope, vec![0, 1], axes);
        assert!(matches!(result, Err(PipelineError::InvalidStream { .. })));
    }

    #[test]
    fn test_record_rejects_misplaced_stream() {
        let streams = [
            SensorStream::empty(SensorKind::Gyroscope),
            SensorStream::empty(SensorKind::Gyroscope),
            SensorStream::empty(SensorKind::Orientation),
            SensorStream::empty(SensorKind::OrientationEuler),
            SensorStream::empty(SensorKind::Emg),
        ];
        assert!(GestureRecord::new("fist", "anna", Utc::now(), streams).is_err());
    }
}
