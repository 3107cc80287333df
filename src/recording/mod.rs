//! Recording types and raw file loading.
//!
//! A recording is one gesture performance captured from every armband sensor.

pub mod loader;
pub mod types;

// Re-export commonly used types
pub use loader::{discover_dataset, load_dataset, load_stream, RecordingFiles};
pub use types::{GestureRecord, SensorKind, SensorStream};
