//! Infrastructure layer: durable store, actions, job bookkeeping, pipeline and workers.
//!
//! - `document_store`: `DocumentStore` boundary with in-memory and Postgres backends
//! - `actions`: claim/complete/force-sync and the administrative connector calls
//! - `jobs`: in-process job registry and its watcher
//! - `pipeline`: one contained connector sync run
//! - `workers`: per-connector poll/heartbeat scheduler
//! - `config`: `DOCSYNC_*` environment configuration

pub mod actions;
pub mod config;
pub mod document_store;
pub mod jobs;
pub mod pipeline;
pub mod sink;
pub mod workers;

pub use actions::{ActionError, ConnectorActions};
pub use config::{AgentConfig, ConfigError};
pub use document_store::{DocumentStore, InMemoryDocumentStore, PostgresDocumentStore, StoreError};
pub use jobs::{InMemoryJobStore, Job, JobStatus, JobStore, JobStoreError, JobWatcher, WatcherConfig};
pub use pipeline::SyncPipeline;
pub use sink::IndexSink;
pub use workers::{Scheduler, SchedulerConfig, SchedulerHandle};
