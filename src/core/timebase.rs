//! Shared time window for the streams of one recording.
//!
//! The armband sensors are clocked independently, so each stream starts and
//! ends at a slightly different instant. The window spans all of them and is
//! widened to whole milliseconds.

use crate::error::{PipelineError, Result};
use crate::recording::{GestureRecord, SensorKind};
use serde::{Deserialize, Serialize};

/// Boundaries are rounded outward to multiples of this many microseconds.
pub const TIMEBASE_GRANULARITY_US: i64 = 1_000;

/// Start and end of a recording's shared grid, in microseconds (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBase {
    pub start_us: i64,
    pub end_us: i64,
}

impl TimeBase {
    /// Number of grid points for the given step, both ends included.
    pub fn grid_len(&self, step_us: i64) -> usize {
        if step_us <= 0 || self.end_us < self.start_us {
            return 0;
        }
        ((self.end_us - self.start_us) / step_us) as usize + 1
    }

    /// The grid timestamps `start, start + step, ..., <= end`.
    pub fn grid(&self, step_us: i64) -> Vec<i64> {
        (0..self.grid_len(step_us) as i64)
            .map(|i| self.start_us + i * step_us)
            .collect()
    }

    /// Duration covered by the window in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        (self.end_us - self.start_us) as f64 / 1000.0
    }
}

/// Compute the shared window over the accelerometer, EMG, gyroscope and
/// orientation streams. The Euler orientation stream does not take part.
pub fn reconcile(record: &GestureRecord) -> Result<TimeBase> {
    let mut start = i64::MAX;
    let mut end = i64::MIN;

    for kind in SensorKind::TIME_BEARING {
        let stream = record.stream(kind);
        let (Some(first), Some(last)) = (stream.first_timestamp(), stream.last_timestamp()) else {
            return Err(PipelineError::EmptyStream(kind));
        };
        start = start.min(first).min(last);
        end = end.max(first).max(last);
    }

    Ok(TimeBase {
        start_us: start.div_euclid(TIMEBASE_GRANULARITY_US) * TIMEBASE_GRANULARITY_US,
        end_us: ceil_to(end, TIMEBASE_GRANULARITY_US),
    })
}

fn ceil_to(value: i64, multiple: i64) -> i64 {
    let rem = value.rem_euclid(multiple);
    if rem == 0 {
        value
    } else {
        value - rem + multiple
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::SensorStream;
    use chrono::Utc;

    fn stream(kind: SensorKind, timestamps: Vec<i64>) -> SensorStream {
        let len = timestamps.len();
        SensorStream::new(kind, timestamps, vec![vec![0.0; len]; kind.axis_count()]).unwrap()
    }

    fn record(acc: Vec<i64>, gyro: Vec<i64>, ori: Vec<i64>, euler: Vec<i64>, emg: Vec<i64>) -> GestureRecord {
        GestureRecord::new(
            "wave",
            "tester",
            Utc::now(),
            [
                stream(SensorKind::Accelerometer, acc),
                stream(SensorKind::Gyroscope, gyro),
                stream(SensorKind::Orientation, ori),
                stream(SensorKind::OrientationEuler, euler),
                stream(SensorKind::Emg, emg),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_window_spans_all_streams_and_rounds_outward() {
        let rec = record(
            vec![10_500, 20_000],
            vec![9_700, 19_000],
            vec![11_000, 21_300],
            vec![0, 99_999],
            vec![10_001, 20_500],
        );
        let base = reconcile(&rec).unwrap();
        assert_eq!(base.start_us, 9_000);
        assert_eq!(base.end_us, 22_000);
    }

    #[test]
    fn test_aligned_boundaries_are_kept() {
        let rec = record(
            vec![0, 4_999_000],
            vec![0, 4_999_000],
            vec![0, 4_999_000],
            vec![0, 4_999_000],
            vec![0, 4_999_000],
        );
        let base = reconcile(&rec).unwrap();
        assert_eq!(base, TimeBase { start_us: 0, end_us: 4_999_000 });
        assert_eq!(base.grid_len(1_000), 5_000);
    }

    #[test]
    fn test_empty_stream_fails() {
        let rec = record(vec![0, 1_000], vec![], vec![0, 1_000], vec![0], vec![0, 1_000]);
        assert_eq!(reconcile(&rec), Err(PipelineError::EmptyStream(SensorKind::Gyroscope)));
    }

    #[test]
    fn test_grid_is_inclusive() {
        let base = TimeBase { start_us: 1_000, end_us: 5_000 };
        assert_eq!(base.grid(1_000), vec![1_000, 2_000, 3_000, 4_000, 5_000]);
        assert_eq!(base.grid_len(3_000), 2);
    }
}
