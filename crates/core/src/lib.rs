//! `docsync-core` - domain building blocks for connector sync orchestration.
//!
//! This crate contains **pure domain** types (no IO, no async runtime).

pub mod error;
pub mod id;
pub mod settings;
pub mod sync;

pub use error::{DomainError, DomainResult};
pub use id::{ConnectorId, JobId, SyncJobId};
pub use settings::{ConnectorSettings, Scheduling};
pub use sync::{SyncOutcome, SyncReport, SyncStatus};
