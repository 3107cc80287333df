//! Diagnostics for batch runs.
//!
//! Tracks how many recordings went through each stage and which ones were
//! left out, so a training run can be audited afterwards.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, PipelineLog, PipelineStats,
    SharedPipelineLog,
};
