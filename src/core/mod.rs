//! Core signal processing for armband recordings.
//!
//! This module contains:
//! - Time base reconciliation across sensor streams
//! - Cubic-spline resampling onto a shared uniform grid
//! - Overlapping frame segmentation
//! - Per-frame feature extraction
//! - Prediction snapshots for export

pub mod features;
pub mod framing;
pub mod prediction;
pub mod resample;
pub mod spline;
pub mod timebase;
pub mod workers;

// Re-export commonly used types
pub use features::{prepare_batch, FeatureExtractor, FeatureVector, PreparedBatch, SkippedRecord};
pub use framing::{split_in_frames, FrameLayout, Frames};
pub use prediction::{PredictionBuilder, PredictionSnapshot, PRODUCER_NAME, SNAPSHOT_VERSION};
pub use resample::{
    resample_batch, resample_record, ConversionOutcome, ResampledGestureRecord, ResampledStream,
};
pub use timebase::{reconcile, TimeBase};
