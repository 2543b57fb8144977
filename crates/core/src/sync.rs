//! Sync run status model.
//!
//! A sync run produces exactly one [`SyncOutcome`]. The outcome is the only
//! channel through which a run reports failure: a failed run carries its error
//! message inside the report instead of propagating it to the caller.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Lifecycle status of a sync, as persisted on connector and job records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    InProgress,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }
}

impl core::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SyncStatus::InProgress),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(DomainError::validation(format!(
                "unknown sync status: {other}"
            ))),
        }
    }
}

/// Per-run counters and terminal error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub index_document_count: u64,
    pub deleted_document_count: u64,
    pub error: Option<String>,
}

impl SyncReport {
    pub fn new(index_document_count: u64, deleted_document_count: u64) -> Self {
        Self {
            index_document_count,
            deleted_document_count,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Terminal result of one sync run.
///
/// Construct through [`SyncOutcome::from`] so that `Failed` is chosen if and
/// only if the report carries an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Succeeded(SyncReport),
    Failed(SyncReport),
}

impl SyncOutcome {
    pub fn report(&self) -> &SyncReport {
        match self {
            SyncOutcome::Succeeded(r) | SyncOutcome::Failed(r) => r,
        }
    }

    pub fn into_report(self) -> SyncReport {
        match self {
            SyncOutcome::Succeeded(r) | SyncOutcome::Failed(r) => r,
        }
    }

    /// The status to persist for this outcome.
    pub fn status(&self) -> SyncStatus {
        match self {
            SyncOutcome::Succeeded(_) => SyncStatus::Completed,
            SyncOutcome::Failed(_) => SyncStatus::Failed,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&str> {
        self.report().error.as_deref()
    }
}

impl From<SyncReport> for SyncOutcome {
    fn from(report: SyncReport) -> Self {
        if report.error.is_some() {
            SyncOutcome::Failed(report)
        } else {
            SyncOutcome::Succeeded(report)
        }
    }
}
