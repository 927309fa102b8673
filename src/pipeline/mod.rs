//! Concurrent stage scheduling across tracks.

pub mod cancel;
pub mod scheduler;

pub use cancel::CancelToken;
pub use scheduler::{PipelineReport, Scheduler, SchedulerConfig};
