//! Long-running background workers.

pub mod scheduler;

pub use scheduler::{ABANDONED_CLAIM_ERROR, Scheduler, SchedulerConfig, SchedulerError, SchedulerHandle, is_due};
