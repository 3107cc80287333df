//! Shared counters and skip diagnostics for pipeline runs.

use crate::core::features::SkippedRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Counters for the current run. Safe to update from worker threads.
#[derive(Debug)]
pub struct PipelineLog {
    /// Recordings resampled onto their grid
    records_converted: AtomicU64,
    /// Recordings that failed conversion
    conversion_failures: AtomicU64,
    /// Feature vectors extracted across all sensors
    feature_vectors: AtomicU64,
    /// Per-class models fitted
    models_fitted: AtomicU64,
    /// Recordings classified
    predictions: AtomicU64,
    /// Records left out because they were too short to frame
    skipped: Mutex<Vec<SkippedRecord>>,
    /// Run start time
    run_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl PipelineLog {
    pub fn new() -> Self {
        Self {
            records_converted: AtomicU64::new(0),
            conversion_failures: AtomicU64::new(0),
            feature_vectors: AtomicU64::new(0),
            models_fitted: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
            skipped: Mutex::new(Vec::new()),
            run_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that accumulates onto stats saved at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("could not load previous pipeline stats: {e}");
        }

        log
    }

    pub fn record_converted(&self, count: u64) {
        self.records_converted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_conversion_failures(&self, count: u64) {
        self.conversion_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_feature_vectors(&self, count: u64) {
        self.feature_vectors.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_models_fitted(&self, count: u64) {
        self.models_fitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_prediction(&self) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Keep a diagnostic for a record that could not be framed.
    pub fn record_skipped(&self, skipped: SkippedRecord) {
        match self.skipped.lock() {
            Ok(mut list) => list.push(skipped),
            Err(poisoned) => poisoned.into_inner().push(skipped),
        }
    }

    pub fn skipped(&self) -> Vec<SkippedRecord> {
        match self.skipped.lock() {
            Ok(list) => list.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Get the current statistics.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            records_converted: self.records_converted.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
            feature_vectors: self.feature_vectors.load(Ordering::Relaxed),
            models_fitted: self.models_fitted.load(Ordering::Relaxed),
            predictions: self.predictions.load(Ordering::Relaxed),
            records_skipped: self.skipped().len() as u64,
            run_start: self.run_start,
            run_duration_secs: (Utc::now() - self.run_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let mut summary = format!(
            "Pipeline Statistics:\n\
             - Records converted: {}\n\
             - Conversion failures: {}\n\
             - Feature vectors extracted: {}\n\
             - Models fitted: {}\n\
             - Predictions made: {}\n\
             - Records skipped: {}\n\
             - Run duration: {} seconds",
            stats.records_converted,
            stats.conversion_failures,
            stats.feature_vectors,
            stats.models_fitted,
            stats.predictions,
            stats.records_skipped,
            stats.run_duration_secs
        );
        for skipped in self.skipped() {
            summary.push_str(&format!("\n  * {skipped}"));
        }
        summary
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                records_converted: stats.records_converted,
                conversion_failures: stats.conversion_failures,
                feature_vectors: stats.feature_vectors,
                models_fitted: stats.models_fitted,
                predictions: stats.predictions,
                skipped: self.skipped(),
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.records_converted
                    .store(persisted.records_converted, Ordering::Relaxed);
                self.conversion_failures
                    .store(persisted.conversion_failures, Ordering::Relaxed);
                self.feature_vectors
                    .store(persisted.feature_vectors, Ordering::Relaxed);
                self.models_fitted
                    .store(persisted.models_fitted, Ordering::Relaxed);
                self.predictions
                    .store(persisted.predictions, Ordering::Relaxed);
                self.skipped = Mutex::new(persisted.skipped);
            }
        }
        Ok(())
    }

    /// Reset all counters and diagnostics.
    pub fn reset(&self) {
        self.records_converted.store(0, Ordering::Relaxed);
        self.conversion_failures.store(0, Ordering::Relaxed);
        self.feature_vectors.store(0, Ordering::Relaxed);
        self.models_fitted.store(0, Ordering::Relaxed);
        self.predictions.store(0, Ordering::Relaxed);
        match self.skipped.lock() {
            Ok(mut list) => list.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Default for PipelineLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of pipeline statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub records_converted: u64,
    pub conversion_failures: u64,
    pub feature_vectors: u64,
    pub models_fitted: u64,
    pub predictions: u64,
    pub records_skipped: u64,
    pub run_start: DateTime<Utc>,
    pub run_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    records_converted: u64,
    conversion_failures: u64,
    feature_vectors: u64,
    models_fitted: u64,
    predictions: u64,
    #[serde(default)]
    skipped: Vec<SkippedRecord>,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared pipeline log.
pub type SharedPipelineLog = Arc<PipelineLog>;

pub fn create_shared_log() -> SharedPipelineLog {
    Arc::new(PipelineLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedPipelineLog {
    Arc::new(PipelineLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::SensorKind;

    fn skipped() -> SkippedRecord {
        SkippedRecord {
            label: "fist".to_string(),
            performed_by: "bob".to_string(),
            sensor: SensorKind::Emg,
            frame_count: 4,
            data_length: 10,
            min_length: 15,
        }
    }

    #[test]
    fn test_counting() {
        let log = PipelineLog::new();
        log.record_converted(3);
        log.record_feature_vectors(12);
        log.record_prediction();
        log.record_prediction();
        log.record_skipped(skipped());

        let stats = log.stats();
        assert_eq!(stats.records_converted, 3);
        assert_eq!(stats.feature_vectors, 12);
        assert_eq!(stats.predictions, 2);
        assert_eq!(stats.records_skipped, 1);
    }

    #[test]
    fn test_reset() {
        let log = PipelineLog::new();
        log.record_models_fitted(8);
        log.record_skipped(skipped());
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.models_fitted, 0);
        assert_eq!(stats.records_skipped, 0);
    }

    #[test]
    fn test_summary_lists_skipped_records() {
        let log = PipelineLog::new();
        log.record_skipped(skipped());
        let summary = log.summary();

        assert!(summary.contains("Records converted"));
        assert!(summary.contains("data length was 10 but needs to be at least 15 for 4 frames"));
    }

    #[test]
    fn test_shared_log_across_threads() {
        let log = create_shared_log();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let log = Arc::clone(&log);
                scope.spawn(move || log.record_converted(5));
            }
        });
        assert_eq!(log.stats().records_converted, 20);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("pipeline_log.json");

        let log = PipelineLog::with_persistence(path.clone());
        log.record_converted(7);
        log.record_skipped(skipped());
        log.save().unwrap();

        let reloaded = PipelineLog::with_persistence(path);
        let stats = reloaded.stats();
        assert_eq!(stats.records_converted, 7);
        assert_eq!(reloaded.skipped(), vec![skipped()]);
    }
}
