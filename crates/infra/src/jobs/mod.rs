//! In-process job bookkeeping.
//!
//! - `Job`: one sync attempt as seen by this process
//! - `JobStore`: concurrent registry keyed by a generated `JobId`
//! - `JobWatcher`: background pruning of terminal jobs and stall reporting
//!
//! Nothing here is durable; the durable job log lives behind `ConnectorActions`.

pub mod store;
pub mod types;
pub mod watcher;

pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{Job, JobStatus};
pub use watcher::{JobWatcher, ReconcileReport, WatcherConfig, WatcherHandle, reconcile};
