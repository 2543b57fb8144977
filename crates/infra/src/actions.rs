//! Durable connector/job actions.
//!
//! Every state transition of a connector record or a durable job record goes
//! through [`ConnectorActions`]. Writes are issued once; failures surface to the
//! caller as [`ActionError`] without internal retry.
//!
//! ## Claim
//!
//! 1. Conditional connector write: only if `last_sync_status != "in_progress"`,
//!    clear `sync_now`, set `last_sync_status = "in_progress"`, stamp `last_synced`.
//! 2. Insert the job record (`status = "in_progress"`, `created_at = now`).
//!
//! If step 2 fails the connector is moved to `failed` with the insert error as
//! `last_sync_error`, so it is not left claimed with no job.
//!
//! ## Complete
//!
//! Connector record first, then the job record. The two writes are independent;
//! a failure of the second leaves the connector terminal and the job
//! `in_progress`, and is reported to the caller.
//!
//! ## Abandoned claims
//!
//! A connector left `in_progress` with no run behind it (a failed completion
//! write, a crashed process) is moved to `failed` by
//! [`ConnectorActions::release_abandoned_claim`]. Deciding that no run owns the
//! claim is the caller's job.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use docsync_core::{ConnectorId, ConnectorSettings, DomainError, SyncJobId, SyncOutcome, SyncStatus};

use crate::document_store::{DocumentStore, Precondition, StoreError};

pub const DEFAULT_CONNECTORS_INDEX: &str = ".docsync-connectors";
pub const DEFAULT_JOBS_INDEX: &str = ".docsync-connectors-sync-jobs";

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("connector {0} not found")]
    ConnectorNotFound(ConnectorId),

    #[error("connector {0} already has a sync in progress")]
    AlreadyInProgress(ConnectorId),

    #[error("invalid connector settings: {0}")]
    InvalidSettings(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persistence boundary for connector and job records.
#[derive(Clone)]
pub struct ConnectorActions {
    store: Arc<dyn DocumentStore>,
    connectors_index: String,
    jobs_index: String,
}

impl core::fmt::Debug for ConnectorActions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectorActions")
            .field("connectors_index", &self.connectors_index)
            .field("jobs_index", &self.jobs_index)
            .finish()
    }
}

impl ConnectorActions {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_indices(store, DEFAULT_CONNECTORS_INDEX, DEFAULT_JOBS_INDEX)
    }

    pub fn with_indices(
        store: Arc<dyn DocumentStore>,
        connectors_index: impl Into<String>,
        jobs_index: impl Into<String>,
    ) -> Self {
        Self {
            store,
            connectors_index: connectors_index.into(),
            jobs_index: jobs_index.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn connectors_index(&self) -> &str {
        &self.connectors_index
    }

    pub fn jobs_index(&self) -> &str {
        &self.jobs_index
    }

    /// Request an out-of-schedule sync and re-enable scheduling.
    #[instrument(skip(self))]
    pub async fn force_sync(&self, connector_id: &ConnectorId) -> Result<(), ActionError> {
        self.update_connector(
            connector_id,
            json!({
                "scheduling": { "enabled": true },
                "sync_now": true,
            }),
        )
        .await?;
        info!(connector_id = %connector_id, "sync requested");
        Ok(())
    }

    /// Register a new connector record with scheduling enabled.
    pub async fn create_connector(
        &self,
        index_name: &str,
        service_type: &str,
    ) -> Result<ConnectorId, ActionError> {
        let id = self
            .store
            .insert(
                &self.connectors_index,
                json!({
                    "index_name": index_name,
                    "service_type": service_type,
                    "configuration": {},
                    "scheduling": { "enabled": true },
                    "sync_now": false,
                }),
            )
            .await?;
        let connector_id = ConnectorId::new(id)?;
        info!(connector_id = %connector_id, service_type, index_name, "connector created");
        Ok(connector_id)
    }

    pub async fn load_connector_settings(
        &self,
        connector_id: &ConnectorId,
    ) -> Result<ConnectorSettings, ActionError> {
        let record = self
            .store
            .get(&self.connectors_index, connector_id.as_str())
            .await?
            .ok_or_else(|| ActionError::ConnectorNotFound(connector_id.clone()))?;
        Ok(ConnectorSettings::from_record(connector_id.clone(), record)?)
    }

    pub async fn update_connector_configuration(
        &self,
        connector_id: &ConnectorId,
        configuration: JsonValue,
    ) -> Result<(), ActionError> {
        self.update_connector(connector_id, json!({ "configuration": configuration }))
            .await
    }

    /// Mark the connector `in_progress` and open a durable job record.
    #[instrument(skip(self))]
    pub async fn claim_job(&self, connector_id: &ConnectorId) -> Result<SyncJobId, ActionError> {
        let now = Utc::now();
        let guard = Precondition::field_not_equals(
            "last_sync_status",
            json!(SyncStatus::InProgress.as_str()),
        );

        let claimed = self
            .store
            .update_if(
                &self.connectors_index,
                connector_id.as_str(),
                &guard,
                json!({
                    "sync_now": false,
                    "last_sync_status": SyncStatus::InProgress.as_str(),
                    "last_synced": now,
                }),
            )
            .await
            .map_err(|e| connector_error(connector_id, e))?;
        if !claimed {
            return Err(ActionError::AlreadyInProgress(connector_id.clone()));
        }

        let inserted = self
            .store
            .insert(
                &self.jobs_index,
                json!({
                    "connector_id": connector_id.as_str(),
                    "status": SyncStatus::InProgress.as_str(),
                    "created_at": now,
                    "completed_at": null,
                    "index_document_count": 0,
                    "deleted_document_count": 0,
                    "error": null,
                }),
            )
            .await;

        let job_id = match inserted {
            Ok(id) => id,
            Err(e) => {
                self.release_claim(connector_id, &e).await;
                return Err(e.into());
            }
        };

        let job_id = SyncJobId::new(job_id)?;
        info!(connector_id = %connector_id, job_id = %job_id, "sync job claimed");
        Ok(job_id)
    }

    async fn release_claim(&self, connector_id: &ConnectorId, cause: &StoreError) {
        let reason = format!("failed to create sync job record: {cause}");
        let released = self
            .store
            .update(
                &self.connectors_index,
                connector_id.as_str(),
                json!({
                    "last_sync_status": SyncStatus::Failed.as_str(),
                    "last_sync_error": reason,
                }),
            )
            .await;
        match released {
            Ok(()) => warn!(connector_id = %connector_id, error = %cause, "claim released after job insert failure"),
            Err(e) => error!(
                connector_id = %connector_id,
                error = %e,
                cause = %cause,
                "connector left in_progress without a job record"
            ),
        }
    }

    /// Move an `in_progress` connector to `failed` with `reason`.
    ///
    /// Returns `false` when the connector was not `in_progress`.
    #[instrument(skip(self))]
    pub async fn release_abandoned_claim(
        &self,
        connector_id: &ConnectorId,
        reason: &str,
    ) -> Result<bool, ActionError> {
        let held = Precondition::field_equals(
            "last_sync_status",
            json!(SyncStatus::InProgress.as_str()),
        );
        let released = self
            .store
            .update_if(
                &self.connectors_index,
                connector_id.as_str(),
                &held,
                json!({
                    "last_sync_status": SyncStatus::Failed.as_str(),
                    "last_sync_error": reason,
                }),
            )
            .await
            .map_err(|e| connector_error(connector_id, e))?;
        if released {
            warn!(connector_id = %connector_id, reason, "abandoned sync claim released");
        }
        Ok(released)
    }

    /// Record the terminal outcome on the connector and the job record.
    #[instrument(skip(self, outcome))]
    pub async fn complete_sync(
        &self,
        connector_id: &ConnectorId,
        job_id: &SyncJobId,
        outcome: &SyncOutcome,
    ) -> Result<SyncStatus, ActionError> {
        let now = Utc::now();
        let status = outcome.status();
        let report = outcome.report();

        self.update_connector(
            connector_id,
            json!({
                "last_sync_status": status.as_str(),
                "last_sync_error": report.error,
                "last_synced": now,
            }),
        )
        .await?;

        self.store
            .update(
                &self.jobs_index,
                job_id.as_str(),
                json!({
                    "status": status.as_str(),
                    "completed_at": now,
                    "index_document_count": report.index_document_count,
                    "deleted_document_count": report.deleted_document_count,
                    "error": report.error,
                }),
            )
            .await?;

        match &report.error {
            Some(err) => warn!(
                connector_id = %connector_id,
                job_id = %job_id,
                indexed = report.index_document_count,
                deleted = report.deleted_document_count,
                error = %err,
                "sync job failed"
            ),
            None => info!(
                connector_id = %connector_id,
                job_id = %job_id,
                indexed = report.index_document_count,
                deleted = report.deleted_document_count,
                "sync job completed"
            ),
        }
        Ok(status)
    }

    /// Stamp `last_seen` on the connector record.
    pub async fn heartbeat(&self, connector_id: &ConnectorId) -> Result<(), ActionError> {
        self.update_connector(connector_id, json!({ "last_seen": Utc::now() }))
            .await
    }

    pub async fn ensure_index_exists(&self, index: &str) -> Result<(), ActionError> {
        if !self.store.index_exists(index).await? {
            self.store.ensure_index(index).await?;
            info!(index, "index created");
        }
        Ok(())
    }

    pub async fn ensure_connectors_index_exists(&self) -> Result<(), ActionError> {
        self.ensure_index_exists(&self.connectors_index).await
    }

    pub async fn ensure_jobs_index_exists(&self) -> Result<(), ActionError> {
        self.ensure_index_exists(&self.jobs_index).await
    }

    async fn update_connector(
        &self,
        connector_id: &ConnectorId,
        patch: JsonValue,
    ) -> Result<(), ActionError> {
        self.store
            .update(&self.connectors_index, connector_id.as_str(), patch)
            .await
            .map_err(|e| connector_error(connector_id, e))
    }
}

fn connector_error(connector_id: &ConnectorId, err: StoreError) -> ActionError {
    if err.is_not_found() {
        ActionError::ConnectorNotFound(connector_id.clone())
    } else {
        ActionError::Store(err)
    }
}
