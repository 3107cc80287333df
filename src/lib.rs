//! Armband Gesture - time alignment, feature extraction and HMM-ensemble
//! classification for multi-sensor armband recordings.
//!
//! A recording holds five independently timestamped streams (accelerometer,
//! gyroscope, orientation quaternion, Euler orientation and 8-channel EMG).
//! The pipeline puts them on one uniform time grid, cuts them into
//! overlapping frames, extracts per-frame features, scores them with one
//! HMM per gesture class for each sensor and fuses the four sensors' scores
//! into a single decision.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Armband Gesture                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌───────────┐   │
//! │  │ Recording │──▶│ TimeBase  │──▶│ Resampler │──▶│  Framer   │   │
//! │  │ (CSV dir) │   │ reconcile │   │ (splines) │   │ (overlap) │   │
//! │  └───────────┘   └───────────┘   └───────────┘   └───────────┘   │
//! │                                                        │         │
//! │                                                        ▼         │
//! │  ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌───────────┐   │
//! │  │Prediction │◀──│  Fusion   │◀──│ HMM per   │◀──│ Features  │   │
//! │  │ snapshot  │   │ (average) │   │  sensor   │   │ (per frm) │   │
//! │  └───────────┘   └───────────┘   └───────────┘   └───────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use armband_gesture::{
//!     core::resample_batch, load_dataset, GestureRecognizer, PipelineConfig,
//! };
//!
//! let config = PipelineConfig::default();
//! let records = load_dataset("recordings").expect("dataset");
//! let outcome = resample_batch(&records, config.grid_step_us, 4);
//! let (recognizer, _report) =
//!     GestureRecognizer::train(&outcome.records, &config, 4).expect("training");
//! let result = recognizer.classify(&outcome.records[0]).expect("classification");
//! println!("{}", result.label());
//! ```

pub mod classifier;
pub mod config;
pub mod core;
pub mod diagnostics;
pub mod error;
pub mod recording;

// Re-export key types at crate root for convenience
pub use classifier::{
    fuse, ClassScore, Classification, FusedDecision, GestureClassifier, GestureRecognizer,
    PerSensorHmmEnsemble,
};
pub use config::{ConfigError, FrameConfig, HmmConfig, PipelineConfig};
pub use core::{
    reconcile, resample_record, split_in_frames, FeatureExtractor, FeatureVector,
    PredictionBuilder, PredictionSnapshot, ResampledGestureRecord, TimeBase,
};
pub use diagnostics::{PipelineLog, SharedPipelineLog};
pub use error::{PipelineError, Result};
pub use recording::{load_dataset, GestureRecord, SensorKind, SensorStream};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
