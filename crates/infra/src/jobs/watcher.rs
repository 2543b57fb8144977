//! Background reconciliation of the in-process job registry.
//!
//! The watcher is started and stopped explicitly by its owner. Each pass:
//! - prunes terminal jobs whose `completed_at` is older than the retention window
//! - reports (never touches) in-progress jobs older than the stall threshold
//!
//! Only the public [`JobStore`] operations are used, so a job the pipeline is
//! still working on (`pending`/`in_progress`) is never removed or mutated.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use docsync_core::JobId;

use super::store::{JobStore, JobStoreError};
use super::types::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    pub tick: Duration,
    pub retention: Duration,
    pub stall_after: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            retention: Duration::from_secs(3600),
            stall_after: Duration::from_secs(3600),
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub pruned: Vec<JobId>,
    pub stalled: Vec<JobId>,
}

/// Handle to control and join the watcher thread.
#[derive(Debug)]
pub struct WatcherHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WatcherHandle {
    /// Request shutdown and wait for the current pass to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

#[derive(Debug)]
pub struct JobWatcher;

impl JobWatcher {
    /// Spawn the watcher thread over `store`.
    pub fn start<S>(store: S, config: WatcherConfig) -> std::io::Result<WatcherHandle>
    where
        S: JobStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("docsync-job-watcher".to_string())
            .spawn(move || watch_loop(&store, config, shutdown_rx))?;

        info!(tick_ms = config.tick.as_millis() as u64, "job watcher started");
        Ok(WatcherHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn watch_loop(store: &dyn JobStore, config: WatcherConfig, shutdown_rx: mpsc::Receiver<()>) {
    loop {
        match shutdown_rx.recv_timeout(config.tick) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        let pass = panic::catch_unwind(AssertUnwindSafe(|| reconcile(store, &config, Utc::now())));
        match pass {
            Ok(report) if !report.pruned.is_empty() => {
                debug!(pruned = report.pruned.len(), "job watcher pruned terminal jobs");
            }
            Ok(_) => {}
            Err(_) => error!("job watcher reconciliation panicked; continuing"),
        }
    }
    info!("job watcher stopped");
}

/// Run one reconciliation pass against `store` as of `now`.
pub fn reconcile(store: &dyn JobStore, config: &WatcherConfig, now: DateTime<Utc>) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for job in store.fetch_all() {
        match job.status {
            JobStatus::Completed | JobStatus::Failed => {
                let Some(completed_at) = job.completed_at else {
                    continue;
                };
                if !older_than(completed_at, now, config.retention) {
                    continue;
                }
                match store.delete_job(job.id) {
                    Ok(()) => report.pruned.push(job.id),
                    // Removed by someone else since the snapshot.
                    Err(JobStoreError::NotFound(_)) => {}
                }
            }
            JobStatus::InProgress => {
                if older_than(job.created_at, now, config.stall_after) {
                    warn!(
                        job_id = %job.id,
                        connector_id = %job.connector_id,
                        created_at = %job.created_at,
                        "sync job has been in progress longer than the stall threshold"
                    );
                    report.stalled.push(job.id);
                }
            }
            JobStatus::Pending => {}
        }
    }

    report
}

fn older_than(at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    (now - at).to_std().is_ok_and(|age| age >= window)
}
