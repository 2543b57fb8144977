//! In-process job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docsync_core::{ConnectorId, JobId, SyncJobId, SyncOutcome, SyncStatus};

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl From<SyncStatus> for JobStatus {
    fn from(status: SyncStatus) -> Self {
        match status {
            SyncStatus::InProgress => JobStatus::InProgress,
            SyncStatus::Completed => JobStatus::Completed,
            SyncStatus::Failed => JobStatus::Failed,
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sync attempt as tracked by the process.
///
/// `id` is generated by the [`JobStore`](super::JobStore) and is unrelated to
/// the durable job id, which is kept separately once the claim succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub connector_id: ConnectorId,
    pub durable_job_id: Option<SyncJobId>,
    pub status: JobStatus,
    pub index_document_count: u64,
    pub deleted_document_count: u64,
    /// Set only when `status` is `Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, connector_id: ConnectorId) -> Self {
        Self {
            id,
            connector_id,
            durable_job_id: None,
            status: JobStatus::Pending,
            index_document_count: 0,
            deleted_document_count: 0,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn mark_in_progress(&mut self, durable_job_id: SyncJobId) {
        self.durable_job_id = Some(durable_job_id);
        self.status = JobStatus::InProgress;
    }

    /// Copy a run's counts and terminal status onto the job.
    pub fn record_outcome(&mut self, outcome: &SyncOutcome) {
        let report = outcome.report();
        self.index_document_count = report.index_document_count;
        self.deleted_document_count = report.deleted_document_count;
        self.error = report.error.clone();
        self.status = outcome.status().into();
        self.completed_at = Some(Utc::now());
    }

    /// Close the job as `Failed` when its outcome could not be persisted.
    ///
    /// Counts are kept from the run; `error` names the persistence failure.
    pub fn record_unpersisted(&mut self, outcome: &SyncOutcome, reason: impl Into<String>) {
        let report = outcome.report();
        self.index_document_count = report.index_document_count;
        self.deleted_document_count = report.deleted_document_count;
        self.error = Some(reason.into());
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
