//! Timestamp repair and resampling onto a shared uniform grid.
//!
//! Every stream of a recording is interpolated with a cubic spline and
//! evaluated on `start, start + step, ..., end` of the recording's
//! [`TimeBase`]. The caller's record is never modified.

use crate::core::spline::{CubicSpline, MIN_KNOTS};
use crate::core::timebase::{reconcile, TimeBase};
use crate::core::workers::parallel_map;
use crate::error::{PipelineError, Result};
use crate::recording::{GestureRecord, SensorKind, SensorStream};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default grid step: one millisecond.
pub const DEFAULT_GRID_STEP_US: i64 = 1_000;

/// One stream on the shared grid. The grid itself is implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampledStream {
    pub kind: SensorKind,
    /// One sequence per axis, in [`SensorKind::axes`] order
    pub axes: Vec<Vec<f64>>,
}

impl ResampledStream {
    /// Samples of the named axis.
    pub fn axis(&self, name: &str) -> Option<&[f64]> {
        self.kind
            .axes()
            .iter()
            .position(|axis| *axis == name)
            .map(|index| self.axes[index].as_slice())
    }

    /// Length shared by all axes.
    pub fn len(&self) -> usize {
        self.axes.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A recording re-expressed on one uniform time grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampledGestureRecord {
    pub label: String,
    pub performed_by: String,
    pub captured_at: DateTime<Utc>,
    pub time_base: TimeBase,
    pub step_us: i64,
    pub accelerometer: ResampledStream,
    pub gyroscope: ResampledStream,
    pub orientation: ResampledStream,
    pub orientation_euler: ResampledStream,
    pub emg: ResampledStream,
}

impl ResampledGestureRecord {
    pub fn stream(&self, kind: SensorKind) -> &ResampledStream {
        match kind {
            SensorKind::Accelerometer => &self.accelerometer,
            SensorKind::Gyroscope => &self.gyroscope,
            SensorKind::Orientation => &self.orientation,
            SensorKind::OrientationEuler => &self.orientation_euler,
            SensorKind::Emg => &self.emg,
        }
    }

    /// Number of grid points.
    pub fn grid_len(&self) -> usize {
        self.time_base.grid_len(self.step_us)
    }
}

/// Repair a timestamp sequence so it is strictly increasing.
///
/// The j-th occurrence of a repeated value `v` becomes `v + j`, the result is
/// sorted, and any value that would still collide with its predecessor is
/// pushed to `predecessor + 1`.
pub fn repair_timestamps(timestamps: &[i64]) -> Vec<i64> {
    let mut order: Vec<usize> = (0..timestamps.len()).collect();
    order.sort_by_key(|&i| timestamps[i]);
    repair_sorted(&order, timestamps)
}

/// Repair a whole stream, keeping each sample paired with its timestamp.
pub fn repair_stream(stream: &SensorStream) -> (Vec<i64>, Vec<Vec<f64>>) {
    let timestamps = stream.timestamps();
    let mut order: Vec<usize> = (0..timestamps.len()).collect();
    order.sort_by_key(|&i| timestamps[i]);

    let repaired = repair_sorted(&order, timestamps);
    let axes = stream
        .axes()
        .iter()
        .map(|axis| order.iter().map(|&i| axis[i]).collect())
        .collect();
    (repaired, axes)
}

/// `order` must be a stable ascending sort of `timestamps`.
fn repair_sorted(order: &[usize], timestamps: &[i64]) -> Vec<i64> {
    let mut repaired = Vec::with_capacity(order.len());
    let mut run_value: Option<i64> = None;
    let mut run_index = 0;

    for &i in order {
        let value = timestamps[i];
        if run_value == Some(value) {
            run_index += 1;
        } else {
            run_value = Some(value);
            run_index = 0;
        }
        let mut candidate = value + run_index;
        if let Some(&previous) = repaired.last() {
            if candidate <= previous {
                candidate = previous + 1;
            }
        }
        repaired.push(candidate);
    }

    repaired
}

fn distinct_count(timestamps: &[i64]) -> usize {
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

/// Resample one stream onto the grid of `time_base`.
pub fn resample_stream(
    stream: &SensorStream,
    time_base: &TimeBase,
    step_us: i64,
) -> Result<ResampledStream> {
    if step_us <= 0 {
        return Err(PipelineError::InputValidation(format!(
            "grid step must be positive, got {step_us}"
        )));
    }

    let distinct = distinct_count(stream.timestamps());
    if distinct < MIN_KNOTS {
        return Err(PipelineError::DataInsufficient {
            sensor: stream.kind(),
            needed: MIN_KNOTS,
            available: distinct,
        });
    }

    let (timestamps, axes) = repair_stream(stream);

    // Work relative to the grid origin to keep spline arithmetic well scaled.
    let knots: Vec<f64> = timestamps
        .iter()
        .map(|&t| (t - time_base.start_us) as f64)
        .collect();
    let grid: Vec<f64> = (0..time_base.grid_len(step_us))
        .map(|i| (i as i64 * step_us) as f64)
        .collect();

    let mut resampled = Vec::with_capacity(axes.len());
    for (axis_name, values) in stream.kind().axes().iter().zip(axes) {
        let spline = CubicSpline::new(knots.clone(), values).map_err(|e| {
            PipelineError::Numerical(format!("{} axis {axis_name}: {e}", stream.kind()))
        })?;
        resampled.push(spline.evaluate_sorted(&grid));
    }

    Ok(ResampledStream {
        kind: stream.kind(),
        axes: resampled,
    })
}

/// Resample every stream of a recording onto its shared grid.
pub fn resample_record(record: &GestureRecord, step_us: i64) -> Result<ResampledGestureRecord> {
    let time_base = reconcile(record)?;
    tracing::debug!(
        "resampling {} by {}: {} grid points over {:.1} ms",
        record.label,
        record.performed_by,
        time_base.grid_len(step_us),
        time_base.duration_ms()
    );

    Ok(ResampledGestureRecord {
        label: record.label.clone(),
        performed_by: record.performed_by.clone(),
        captured_at: record.captured_at,
        time_base,
        step_us,
        accelerometer: resample_stream(&record.accelerometer, &time_base, step_us)?,
        gyroscope: resample_stream(&record.gyroscope, &time_base, step_us)?,
        orientation: resample_stream(&record.orientation, &time_base, step_us)?,
        orientation_euler: resample_stream(&record.orientation_euler, &time_base, step_us)?,
        emg: resample_stream(&record.emg, &time_base, step_us)?,
    })
}

/// A recording that could not be converted.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionFailure {
    pub label: String,
    pub performed_by: String,
    pub captured_at: DateTime<Utc>,
    pub error: PipelineError,
}

impl std::fmt::Display for ConversionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} by {} ({}): {}",
            self.label,
            self.performed_by,
            self.captured_at.to_rfc3339(),
            self.error
        )
    }
}

/// Result of converting a batch of recordings.
#[derive(Debug, Clone, Default)]
pub struct ConversionOutcome {
    pub records: Vec<ResampledGestureRecord>,
    pub failures: Vec<ConversionFailure>,
}

/// Resample a batch of recordings, one worker per recording.
///
/// Failures are collected rather than aborting the batch.
pub fn resample_batch(records: &[GestureRecord], step_us: i64, workers: usize) -> ConversionOutcome {
    let results = parallel_map(records, workers, |record| resample_record(record, step_us));

    let mut outcome = ConversionOutcome::default();
    for (record, result) in records.iter().zip(results) {
        match result {
            Ok(resampled) => outcome.records.push(resampled),
            Err(error) => {
                let failure = ConversionFailure {
                    label: record.label.clone(),
                    performed_by: record.performed_by.clone(),
                    captured_at: record.captured_at,
                    error,
                };
                tracing::warn!("could not convert {failure}");
                outcome.failures.push(failure);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_stream(kind: SensorKind, count: usize, step: i64) -> SensorStream {
        let timestamps: Vec<i64> = (0..count as i64).map(|i| i * step).collect();
        let axes = (0..kind.axis_count())
            .map(|a| (0..count).map(|i| (i as f64 * 0.01 + a as f64).sin()).collect())
            .collect();
        SensorStream::new(kind, timestamps, axes).unwrap()
    }

    fn uniform_record(count: usize) -> GestureRecord {
        GestureRecord::new(
            "fist",
            "tester",
            Utc::now(),
            SensorKind::ALL.map(|kind| uniform_stream(kind, count, 1_000)),
        )
        .unwrap()
    }

    #[test]
    fn test_triple_duplicate_repair() {
        assert_eq!(repair_timestamps(&[100, 100, 100]), vec![100, 101, 102]);
    }

    #[test]
    fn test_repair_sorts_and_is_strictly_increasing() {
        let raw = vec![5_000, 3_000, 3_000, 4_000, 3_001, 1_000, 1_000];
        let repaired = repair_timestamps(&raw);
        assert!(repaired.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(repaired.len(), raw.len());
        assert_eq!(repaired[0], 1_000);
        assert_eq!(repaired[1], 1_001);
        // 3000, 3001 from the duplicate run, then the original 3001 is pushed on.
        assert_eq!(&repaired[2..5], &[3_000, 3_001, 3_002]);
    }

    #[test]
    fn test_repair_keeps_samples_paired() {
        let stream = SensorStream::new(
            SensorKind::Accelerometer,
            vec![2_000, 1_000, 1_000],
            vec![vec![2.0, 1.0, 1.5], vec![0.0; 3], vec![0.0; 3]],
        )
        .unwrap();
        let (timestamps, axes) = repair_stream(&stream);
        assert_eq!(timestamps, vec![1_000, 1_001, 2_000]);
        assert_eq!(axes[0], vec![1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_repair_does_not_touch_input() {
        let record = uniform_record(10);
        let before = record.clone();
        let _ = resample_record(&record, 1_000).unwrap();
        assert_eq!(record, before);
    }

    #[test]
    fn test_grid_length_five_thousand() {
        let record = uniform_record(5_000);
        let resampled = resample_record(&record, 1_000).unwrap();
        assert_eq!(resampled.time_base.start_us, 0);
        assert_eq!(resampled.time_base.end_us, 4_999_000);
        for kind in SensorKind::ALL {
            let stream = resampled.stream(kind);
            assert_eq!(stream.axes.len(), kind.axis_count());
            assert!(stream.axes.iter().all(|axis| axis.len() == 5_000));
        }
    }

    #[test]
    fn test_values_on_native_grid_are_preserved() {
        let record = uniform_record(50);
        let resampled = resample_record(&record, 1_000).unwrap();
        let original = &record.gyroscope.axes()[1];
        let values = resampled.gyroscope.axis("y").unwrap();
        for (a, b) in original.iter().zip(values) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_too_few_distinct_timestamps() {
        let stream = SensorStream::new(
            SensorKind::Gyroscope,
            vec![0, 0, 1_000, 1_000, 2_000],
            vec![vec![0.0; 5]; 3],
        )
        .unwrap();
        let base = TimeBase {
            start_us: 0,
            end_us: 2_000,
        };
        assert_eq!(
            resample_stream(&stream, &base, 1_000),
            Err(PipelineError::DataInsufficient {
                sensor: SensorKind::Gyroscope,
                needed: 4,
                available: 3,
            })
        );
    }

    #[test]
    fn test_batch_collects_failures() {
        let good = uniform_record(20);
        let mut bad = uniform_record(20);
        bad.emg = SensorStream::new(SensorKind::Emg, vec![0, 1_000], vec![vec![0.0; 2]; 8]).unwrap();

        let outcome = resample_batch(&[good, bad, uniform_record(30)], 1_000, 2);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            outcome.failures[0].error,
            PipelineError::DataInsufficient {
                sensor: SensorKind::Emg,
                ..
            }
        ));
        assert_eq!(outcome.records[1].grid_len(), 30);

        let line = outcome.failures[0].to_string();
        assert!(line.starts_with("fist by tester ("));
        assert!(line.ends_with(&outcome.failures[0].error.to_string()));
    }
}
