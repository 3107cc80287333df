//! Feature computation from framed sensor data.
//!
//! Inertial and orientation sensors get frequency-domain features (DC term,
//! energy, spectral entropy) and time-domain features (standard deviation,
//! cross-axis correlation). EMG gets autoregressive coefficients and mean
//! absolute value per channel. Per-frame features are concatenated in frame
//! order and scaled into [0, 1] per recording.

use crate::core::framing::{split_in_frames, FrameLayout, Frames};
use crate::core::resample::ResampledGestureRecord;
use crate::recording::SensorKind;
use nalgebra::{DMatrix, DVector};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Default autoregressive order for EMG features.
pub const DEFAULT_AR_ORDER: usize = 4;

/// Singular values below this (relative) are treated as zero in the AR fit.
const AR_SVD_EPS: f64 = 1e-12;

/// A per-recording feature vector for one sensor, already scaled into [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub sensor: SensorKind,
    pub frame_count: usize,
    pub values: Vec<f64>,
}

impl FeatureVector {
    /// Number of features contributed by each frame.
    pub fn features_per_frame(&self) -> usize {
        if self.frame_count == 0 {
            0
        } else {
            self.values.len() / self.frame_count
        }
    }

    /// The vector viewed as a sequence of per-frame observations.
    pub fn observations(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.features_per_frame().max(1))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Extracts per-frame features. Holds an FFT planner so plans are reused.
pub struct FeatureExtractor {
    planner: FftPlanner<f64>,
    ar_order: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_AR_ORDER)
    }
}

impl FeatureExtractor {
    pub fn new(ar_order: usize) -> Self {
        Self {
            planner: FftPlanner::new(),
            ar_order,
        }
    }

    pub fn ar_order(&self) -> usize {
        self.ar_order
    }

    /// Features produced per frame for `kind`.
    pub fn features_per_frame(&self, kind: SensorKind) -> usize {
        let axes = kind.axis_count();
        if kind.is_emg() {
            axes * (self.ar_order + 1) + axes
        } else {
            3 * axes + axes + axes * (axes - 1) / 2
        }
    }

    /// Mean (DC term), energy and entropy per axis, grouped by feature.
    pub fn frequency_domain_features(&mut self, frame: &[&[f64]]) -> Vec<f64> {
        let mut means = Vec::with_capacity(frame.len());
        let mut energies = Vec::with_capacity(frame.len());
        let mut entropies = Vec::with_capacity(frame.len());

        for axis in frame {
            let spectrum = self.spectrum(axis);
            means.push(spectrum.first().map_or(0.0, |dc| dc.re));
            let non_dc = spectrum.get(1..).unwrap_or(&[]);
            energies.push(spectral_energy(non_dc, axis.len()));
            entropies.push(spectral_entropy(non_dc));
        }

        means.extend(energies);
        means.extend(entropies);
        means
    }

    /// Standard deviation per axis, then correlation for every axis pair.
    pub fn time_domain_features(frame: &[&[f64]]) -> Vec<f64> {
        let mut features: Vec<f64> = frame
            .iter()
            .map(|axis| axis.iter().population_std_dev())
            .collect();

        for (i, a) in frame.iter().enumerate() {
            for b in &frame[i + 1..] {
                features.push(axis_correlation(a, b));
            }
        }

        features
    }

    /// AR coefficients per channel (intercept first), then MAV per channel.
    pub fn emg_features(&self, frame: &[&[f64]]) -> Vec<f64> {
        let mut features = Vec::with_capacity(frame.len() * (self.ar_order + 2));
        for channel in frame {
            features.extend(autoregressive_coefficients(channel, self.ar_order));
        }
        features.extend(frame.iter().map(|channel| mean_absolute_value(channel)));
        features
    }

    /// All features for one frame of the given sensor.
    pub fn frame_features(&mut self, kind: SensorKind, frame: &[&[f64]]) -> Vec<f64> {
        if kind.is_emg() {
            self.emg_features(frame)
        } else {
            let mut features = self.frequency_domain_features(frame);
            features.extend(Self::time_domain_features(frame));
            features
        }
    }

    /// Concatenate per-frame features in frame order (unscaled).
    pub fn create_feature_vector(&mut self, frames: &Frames<'_>, kind: SensorKind) -> Vec<f64> {
        let mut values = Vec::with_capacity(frames.frame_count() * self.features_per_frame(kind));
        for index in 0..frames.frame_count() {
            let frame = frames.frame(index);
            values.extend(self.frame_features(kind, &frame));
        }
        values
    }

    /// Frame one resampled recording and build its scaled feature vector.
    ///
    /// Returns `None` when the recording is too short for `frame_count`.
    pub fn extract(
        &mut self,
        record: &ResampledGestureRecord,
        kind: SensorKind,
        frame_count: usize,
    ) -> Option<FeatureVector> {
        let frames = split_in_frames(&record.stream(kind).axes, frame_count)?;
        let raw = self.create_feature_vector(&frames, kind);
        Some(FeatureVector {
            sensor: kind,
            frame_count,
            values: normalize_record(&raw),
        })
    }

    fn spectrum(&mut self, samples: &[f64]) -> Vec<Complex<f64>> {
        let mut buffer: Vec<Complex<f64>> =
            samples.iter().map(|&x| Complex::new(x, 0.0)).collect();
        if !buffer.is_empty() {
            let fft = self.planner.plan_fft_forward(buffer.len());
            fft.process(&mut buffer);
        }
        buffer
    }
}

/// Sum of squared magnitudes of the non-DC coefficients over frame length.
fn spectral_energy(non_dc: &[Complex<f64>], frame_length: usize) -> f64 {
    if frame_length == 0 {
        return 0.0;
    }
    non_dc.iter().map(|c| c.norm_sqr()).sum::<f64>() / frame_length as f64
}

/// Shannon entropy (bits) of the normalized non-DC magnitude distribution.
/// Zero-probability bins are skipped.
fn spectral_entropy(non_dc: &[Complex<f64>]) -> f64 {
    let magnitudes: Vec<f64> = non_dc.iter().map(|c| c.norm()).collect();
    let total: f64 = magnitudes.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return 0.0;
    }

    magnitudes
        .iter()
        .map(|m| m / total)
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.log2())
        .sum::<f64>()
        .max(0.0)
}

/// Normalized cross-correlation of two axes over one frame.
///
/// Returns 0.0 when either axis has no variance.
fn axis_correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let len = n as f64;

    let cross = a.iter().zip(b).map(|(x, y)| (x * y).abs()).sum::<f64>() / len;
    let same_a = a.iter().map(|x| (x * x).abs()).sum::<f64>() / len;
    let same_b = b.iter().map(|y| (y * y).abs()).sum::<f64>() / len;
    let mean_a = a.iter().mean();
    let mean_b = b.iter().mean();

    let numerator = cross - mean_a * mean_b;
    let denominator = (same_a - mean_a * mean_a).sqrt() * (same_b - mean_b * mean_b).sqrt();
    let correlation = numerator / denominator;

    if denominator > 0.0 && correlation.is_finite() {
        correlation
    } else {
        0.0
    }
}

/// Conditional least-squares AR fit with intercept: `[c, a_1, ..., a_order]`.
pub fn autoregressive_coefficients(signal: &[f64], order: usize) -> Vec<f64> {
    let params = order + 1;
    if signal.len() <= order {
        return vec![0.0; params];
    }

    let rows = signal.len() - order;
    let design = DMatrix::from_fn(rows, params, |r, c| {
        if c == 0 {
            1.0
        } else {
            signal[order + r - c]
        }
    });
    let target = DVector::from_iterator(rows, signal[order..].iter().copied());

    match design.svd(true, true).solve(&target, AR_SVD_EPS) {
        Ok(solution) if solution.iter().all(|v| v.is_finite()) => solution.iter().copied().collect(),
        Ok(_) | Err(_) => {
            tracing::debug!("AR fit failed on a {}-sample window", signal.len());
            vec![0.0; params]
        }
    }
}

fn mean_absolute_value(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().map(|x| x.abs()).sum::<f64>() / signal.len() as f64
}

/// Take absolute values and min-max scale them into [0, 1] for one recording.
///
/// A constant vector scales to all zeros; non-finite entries become 0.
pub fn normalize_record(values: &[f64]) -> Vec<f64> {
    let magnitudes: Vec<f64> = values
        .iter()
        .map(|v| if v.is_finite() { v.abs() } else { 0.0 })
        .collect();

    let min = magnitudes.iter().copied().fold(f64::INFINITY, f64::min);
    let max = magnitudes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    magnitudes
        .iter()
        .map(|v| if range > 0.0 { (v - min) / range } else { 0.0 })
        .collect()
}

/// A recording left out of a batch because it could not be framed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub label: String,
    pub performed_by: String,
    pub sensor: SensorKind,
    pub frame_count: usize,
    pub data_length: usize,
    pub min_length: usize,
}

impl std::fmt::Display for SkippedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} by {} ({}): data length was {} but needs to be at least {} for {} frames",
            self.label,
            self.performed_by,
            self.sensor,
            self.data_length,
            self.min_length,
            self.frame_count
        )
    }
}

/// Feature vectors and labels for one sensor across a batch of recordings.
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub observations: Vec<FeatureVector>,
    pub labels: Vec<String>,
    pub skipped: Vec<SkippedRecord>,
}

/// Extract one sensor's feature vectors for every recording that can be framed.
pub fn prepare_batch(
    extractor: &mut FeatureExtractor,
    records: &[ResampledGestureRecord],
    kind: SensorKind,
    frame_count: usize,
) -> PreparedBatch {
    let mut batch = PreparedBatch::default();

    for record in records {
        match extractor.extract(record, kind, frame_count) {
            Some(vector) => {
                batch.observations.push(vector);
                batch.labels.push(record.label.clone());
            }
            None => {
                let skipped = SkippedRecord {
                    label: record.label.clone(),
                    performed_by: record.performed_by.clone(),
                    sensor: kind,
                    frame_count,
                    data_length: record.stream(kind).len(),
                    min_length: FrameLayout::min_data_length(frame_count),
                };
                tracing::warn!("skipping record: {skipped}");
                batch.skipped.push(skipped);
            }
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resample::ResampledStream;
    use crate::core::timebase::TimeBase;
    use chrono::Utc;

    fn sine(len: usize, freq: f64, phase: f64) -> Vec<f64> {
        (0..len)
            .map(|i| (i as f64 * freq + phase).sin())
            .collect()
    }

    fn record(len: usize, label: &str) -> ResampledGestureRecord {
        let stream = |kind: SensorKind| ResampledStream {
            kind,
            axes: (0..kind.axis_count())
                .map(|a| sine(len, 0.05 * (a + 1) as f64, a as f64))
                .collect(),
        };
        ResampledGestureRecord {
            label: label.to_string(),
            performed_by: "tester".to_string(),
            captured_at: Utc::now(),
            time_base: TimeBase {
                start_us: 0,
                end_us: (len as i64 - 1) * 1_000,
            },
            step_us: 1_000,
            accelerometer: stream(SensorKind::Accelerometer),
            gyroscope: stream(SensorKind::Gyroscope),
            orientation: stream(SensorKind::Orientation),
            orientation_euler: stream(SensorKind::OrientationEuler),
            emg: stream(SensorKind::Emg),
        }
    }

    #[test]
    fn test_frequency_features_of_constant_signal() {
        let mut extractor = FeatureExtractor::default();
        let axis = vec![2.0; 8];
        let features = extractor.frequency_domain_features(&[&axis]);
        // DC term is the sum, no energy.
        assert!((features[0] - 16.0).abs() < 1e-9);
        assert!(features[1].abs() < 1e-9);
        assert!(features[2].is_finite() && features[2] >= 0.0);
    }

    #[test]
    fn test_frequency_features_grouped_by_kind() {
        let mut extractor = FeatureExtractor::default();
        let x = sine(16, 0.4, 0.0);
        let y = vec![1.0; 16];
        let features = extractor.frequency_domain_features(&[&x, &y]);
        assert_eq!(features.len(), 6);
        // means, then energies, then entropies
        assert!((features[1] - 16.0).abs() < 1e-9);
        assert!(features[2] > 0.0);
        assert!(features[3].abs() < 1e-9);
        assert!(features[4] > 0.0);
        assert!(features[5] >= 0.0);
    }

    #[test]
    fn test_energy_matches_parseval() {
        let mut extractor = FeatureExtractor::default();
        let x = vec![1.0, -1.0, 1.0, -1.0];
        let features = extractor.frequency_domain_features(&[&x]);
        // Only the Nyquist bin (magnitude 4) is non-zero: 16 / 4.
        assert!((features[1] - 4.0).abs() < 1e-9);
        // A single non-zero bin has zero entropy.
        assert!(features[2].abs() < 1e-12);
    }

    #[test]
    fn test_entropy_is_finite_and_non_negative() {
        let mut extractor = FeatureExtractor::default();
        for len in [6, 7, 16, 33] {
            for freq in [0.0, 0.1, 1.3] {
                let axis = sine(len, freq, 0.3);
                let features = extractor.frequency_domain_features(&[&axis]);
                let entropy = features[2];
                assert!(entropy.is_finite());
                assert!(entropy >= 0.0);
            }
        }
    }

    #[test]
    fn test_time_domain_std_and_pairs() {
        let x = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let y: Vec<f64> = x.iter().map(|v| v * 2.0).collect();
        let z = vec![1.0; 8];
        let features = FeatureExtractor::time_domain_features(&[&x, &y, &z]);
        assert_eq!(features.len(), 6);
        assert!((features[0] - 2.0).abs() < 1e-9);
        assert!((features[1] - 4.0).abs() < 1e-9);
        assert_eq!(features[2], 0.0);
        // x,y perfectly correlated; constant z gives 0.
        assert!((features[3] - 1.0).abs() < 1e-9);
        assert_eq!(features[4], 0.0);
        assert_eq!(features[5], 0.0);
    }

    #[test]
    fn test_ar_recovers_coefficients() {
        // y_t = 0.5 + 0.6 y_{t-1} - 0.2 y_{t-2}, noise free
        let mut signal = vec![1.0, 2.0];
        for t in 2..15 {
            signal.push(0.5 + 0.6 * signal[t - 1] - 0.2 * signal[t - 2]);
        }
        let coefficients = autoregressive_coefficients(&signal, 2);
        assert_eq!(coefficients.len(), 3);
        assert!((coefficients[0] - 0.5).abs() < 1e-6);
        assert!((coefficients[1] - 0.6).abs() < 1e-6);
        assert!((coefficients[2] + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_ar_short_or_constant_window_is_finite() {
        assert_eq!(autoregressive_coefficients(&[1.0, 2.0], 4), vec![0.0; 5]);
        let coefficients = autoregressive_coefficients(&[3.0; 6], 4);
        assert_eq!(coefficients.len(), 5);
        assert!(coefficients.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_emg_layout() {
        let extractor = FeatureExtractor::new(4);
        let channels: Vec<Vec<f64>> = (0..8).map(|c| sine(20, 0.3, c as f64)).collect();
        let frame: Vec<&[f64]> = channels.iter().map(Vec::as_slice).collect();
        let features = extractor.emg_features(&frame);
        assert_eq!(features.len(), 8 * 5 + 8);
        let mav_first = mean_absolute_value(&channels[0]);
        assert!((features[40] - mav_first).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_record() {
        let scaled = normalize_record(&[-4.0, 2.0, 0.0, 1.0]);
        assert_eq!(scaled, vec![1.0, 0.5, 0.0, 0.25]);
        assert_eq!(normalize_record(&[3.0, -3.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_feature_vector_length_is_deterministic() {
        let mut extractor = FeatureExtractor::default();
        for kind in SensorKind::ALL {
            let expected = extractor.features_per_frame(kind) * 4;
            for len in [50, 51, 120] {
                let vector = extractor.extract(&record(len, "fist"), kind, 4).unwrap();
                assert_eq!(vector.len(), expected);
                assert_eq!(vector.observations().count(), 4);
                assert!(vector.values.iter().all(|v| (0.0..=1.0).contains(v)));
            }
        }
        assert_eq!(extractor.features_per_frame(SensorKind::Accelerometer), 15);
        assert_eq!(extractor.features_per_frame(SensorKind::Orientation), 22);
        assert_eq!(extractor.features_per_frame(SensorKind::Emg), 48);
    }

    #[test]
    fn test_prepare_batch_skips_short_records() {
        let mut extractor = FeatureExtractor::default();
        let records = vec![record(100, "fist"), record(10, "wave"), record(60, "wave")];
        let batch = prepare_batch(&mut extractor, &records, SensorKind::Gyroscope, 4);
        assert_eq!(batch.observations.len(), 2);
        assert_eq!(batch.labels, vec!["fist".to_string(), "wave".to_string()]);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].data_length, 10);
        assert_eq!(batch.skipped[0].min_length, 15);
    }
}
