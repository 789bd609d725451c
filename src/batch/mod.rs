//! Batch execution of independent jobs under a concurrency cap.

pub mod scheduler;

pub use scheduler::{BatchEvent, BatchReport, BatchRun, BatchScheduler};
