//! Per-connector scheduler.
//!
//! Two independent periodic loops per connector:
//! - poll: load settings, decide whether a sync is due, then claim, run and complete
//! - heartbeat: stamp `last_seen` on the connector record
//!
//! Every tick is contained: an error is logged and the loop waits for the next
//! tick. Shutdown stops new ticks; a run already in flight finishes first.
//!
//! Scheduling is single-process. A connector that reads `in_progress` while the
//! job store holds no unfinished job for it has lost its run (a completion
//! write failed, or a previous process died mid-run); the tick releases that
//! claim before deciding whether the connector is due.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use docsync_connectors::{ConnectorRegistry, RegistryError};
use docsync_core::{ConnectorId, ConnectorSettings, JobId, SyncOutcome, SyncStatus};

use crate::actions::{ActionError, ConnectorActions};
use crate::jobs::{Job, JobStore};
use crate::pipeline::SyncPipeline;

/// `last_sync_error` written when an abandoned claim is released.
pub const ABANDONED_CLAIM_ERROR: &str = "sync interrupted before its outcome was recorded";

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Action(#[from] ActionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

/// Decide whether `settings` calls for a sync at `now`.
pub fn is_due(settings: &ConnectorSettings, now: DateTime<Utc>) -> bool {
    if settings.is_in_progress() {
        return false;
    }
    if settings.sync_now {
        return true;
    }
    if !settings.scheduling.enabled {
        return false;
    }

    let Some(expr) = settings.scheduling.interval.as_deref() else {
        return false;
    };
    let schedule = match Schedule::from_str(expr) {
        Ok(schedule) => schedule,
        Err(e) => {
            warn!(connector_id = %settings.id, interval = expr, error = %e, "invalid scheduling interval, skipping");
            return false;
        }
    };

    let Some(since) = settings.last_synced else {
        return true;
    };
    schedule.after(&since).take(1).any(|next| next <= now)
}

pub struct Scheduler {
    connector_id: ConnectorId,
    actions: ConnectorActions,
    registry: Arc<ConnectorRegistry>,
    pipeline: SyncPipeline,
    jobs: Arc<dyn JobStore>,
    config: SchedulerConfig,
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("connector_id", &self.connector_id)
            .field("config", &self.config)
            .finish()
    }
}

impl Scheduler {
    pub fn new(
        connector_id: ConnectorId,
        actions: ConnectorActions,
        registry: Arc<ConnectorRegistry>,
        pipeline: SyncPipeline,
        jobs: Arc<dyn JobStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            connector_id,
            actions,
            registry,
            pipeline,
            jobs,
            config,
        }
    }

    pub fn connector_id(&self) -> &ConnectorId {
        &self.connector_id
    }

    /// Current settings for this scheduler's connector.
    ///
    /// A failed read yields an empty list: nothing is due this tick.
    pub async fn connector_settings(&self) -> Vec<ConnectorSettings> {
        match self.actions.load_connector_settings(&self.connector_id).await {
            Ok(settings) => vec![settings],
            Err(e) => {
                warn!(connector_id = %self.connector_id, error = %e, "could not load connector settings");
                Vec::new()
            }
        }
    }

    /// One poll tick. Returns the outcome of the run it triggered, if any.
    pub async fn tick(&self) -> Result<Option<SyncOutcome>, SchedulerError> {
        let now = Utc::now();
        for mut settings in self.connector_settings().await {
            if self.release_if_abandoned(&settings).await? {
                settings.last_sync_status = Some(SyncStatus::Failed);
                settings.last_sync_error = Some(ABANDONED_CLAIM_ERROR.to_string());
            }
            if !is_due(&settings, now) {
                debug!(connector_id = %settings.id, "connector not due");
                continue;
            }

            let connector = self.registry.resolve(&settings.service_type)?;
            let durable_job_id = match self.actions.claim_job(&settings.id).await {
                Ok(id) => id,
                Err(ActionError::AlreadyInProgress(id)) => {
                    info!(connector_id = %id, "sync already in progress, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let job = self.jobs.create_job(settings.id.clone());
            self.record(job.id, &mut |j: &mut Job| j.mark_in_progress(durable_job_id.clone()));

            let outcome = self.pipeline.run(connector, settings.clone()).await;

            // The job turns terminal only once the outcome is durable.
            if let Err(e) = self
                .actions
                .complete_sync(&settings.id, &durable_job_id, &outcome)
                .await
            {
                let reason = format!("sync outcome not persisted: {e}");
                self.record(job.id, &mut |j: &mut Job| j.record_unpersisted(&outcome, reason.clone()));
                return Err(e.into());
            }
            self.record(job.id, &mut |j: &mut Job| j.record_outcome(&outcome));
            return Ok(Some(outcome));
        }
        Ok(None)
    }

    /// Release a claim on this connector left by a run that no longer exists.
    ///
    /// Called once at agent start, before the loops run, for claims left by a
    /// previous process.
    pub async fn recover_abandoned_claim(&self) -> Result<bool, ActionError> {
        let settings = self.actions.load_connector_settings(&self.connector_id).await?;
        self.release_if_abandoned(&settings).await
    }

    async fn release_if_abandoned(&self, settings: &ConnectorSettings) -> Result<bool, ActionError> {
        if !settings.is_in_progress() || self.has_unfinished_job(&settings.id) {
            return Ok(false);
        }
        self.actions
            .release_abandoned_claim(&settings.id, ABANDONED_CLAIM_ERROR)
            .await
    }

    fn has_unfinished_job(&self, connector_id: &ConnectorId) -> bool {
        self.jobs
            .fetch_all()
            .iter()
            .any(|job| &job.connector_id == connector_id && !job.is_terminal())
    }

    pub async fn heartbeat(&self) -> Result<(), ActionError> {
        self.actions.heartbeat(&self.connector_id).await?;
        debug!(connector_id = %self.connector_id, "heartbeat");
        Ok(())
    }

    fn record(&self, id: JobId, mutate: &mut dyn FnMut(&mut Job)) {
        if let Err(e) = self.jobs.update_job(id, mutate) {
            warn!(connector_id = %self.connector_id, job_id = %id, error = %e, "job bookkeeping update failed");
        }
    }

    /// Start the poll and heartbeat loops.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let poll = {
            let scheduler = self.clone();
            let mut shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(scheduler.config.poll_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = interval.tick() => {}
                    }
                    if let Err(e) = scheduler.tick().await {
                        error!(connector_id = %scheduler.connector_id, error = %e, "poll tick failed");
                    }
                }
                info!(connector_id = %scheduler.connector_id, "poll loop stopped");
            })
        };

        let heartbeat = {
            let scheduler = self.clone();
            let mut shutdown = shutdown_rx;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(scheduler.config.heartbeat_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = interval.tick() => {}
                    }
                    if let Err(e) = scheduler.heartbeat().await {
                        warn!(connector_id = %scheduler.connector_id, error = %e, "heartbeat failed");
                    }
                }
            })
        };

        info!(connector_id = %self.connector_id, "scheduler started");
        SchedulerHandle {
            connector_id: self.connector_id.clone(),
            shutdown: shutdown_tx,
            tasks: vec![poll, heartbeat],
        }
    }
}

/// Handle to stop a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    connector_id: ConnectorId,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn connector_id(&self) -> &ConnectorId {
        &self.connector_id
    }

    /// Stop scheduling new ticks and wait for the in-flight tick to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(connector_id = %self.connector_id, error = %e, "scheduler task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::{DocumentStore, InMemoryDocumentStore, Precondition, StoreError};
    use crate::jobs::{InMemoryJobStore, JobStatus};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use docsync_connectors::{Connector, ConnectorError, Document, STUB_SERVICE_TYPE, Sink, StubConnector};
    use serde_json::{Value as JsonValue, json};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, h, m, 0).unwrap()
    }

    fn settings(record: JsonValue) -> ConnectorSettings {
        ConnectorSettings::from_record(ConnectorId::new("c1").unwrap(), record).unwrap()
    }

    #[test]
    fn sync_now_is_due_even_without_scheduling() {
        let s = settings(json!({"sync_now": true, "scheduling": {"enabled": false}}));
        assert!(is_due(&s, at(10, 0)));
    }

    #[test]
    fn in_progress_is_never_due() {
        let s = settings(json!({"sync_now": true, "last_sync_status": "in_progress"}));
        assert!(!is_due(&s, at(10, 0)));
    }

    #[test]
    fn disabled_or_unscheduled_is_not_due() {
        let disabled = settings(json!({"scheduling": {"enabled": false, "interval": "0 * * * * *"}}));
        let no_interval = settings(json!({"scheduling": {"enabled": true}}));
        let garbage = settings(json!({"scheduling": {"enabled": true, "interval": "whenever"}}));
        assert!(!is_due(&disabled, at(10, 0)));
        assert!(!is_due(&no_interval, at(10, 0)));
        assert!(!is_due(&garbage, at(10, 0)));
    }

    #[test]
    fn never_synced_is_due() {
        let s = settings(json!({"scheduling": {"enabled": true, "interval": "0 0 * * * *"}}));
        assert!(is_due(&s, at(10, 30)));
    }

    #[test]
    fn due_when_an_occurrence_passed_since_last_sync() {
        let hourly = |last: DateTime<Utc>| {
            settings(json!({
                "scheduling": {"enabled": true, "interval": "0 0 * * * *"},
                "last_synced": last,
            }))
        };
        assert!(is_due(&hourly(at(9, 50)), at(10, 30)));
        assert!(!is_due(&hourly(at(10, 5)), at(10, 30)));
    }

    struct Fixture {
        store: Arc<InMemoryDocumentStore>,
        actions: ConnectorActions,
        jobs: Arc<InMemoryJobStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryDocumentStore::new());
            Self {
                actions: ConnectorActions::new(store.clone()),
                store,
                jobs: InMemoryJobStore::arc(),
            }
        }

        fn scheduler(&self, connector_id: ConnectorId) -> Scheduler {
            let mut registry = ConnectorRegistry::new();
            registry
                .register(STUB_SERVICE_TYPE, || Arc::new(StubConnector::new()) as Arc<dyn Connector>)
                .unwrap();
            Scheduler::new(
                connector_id,
                self.actions.clone(),
                Arc::new(registry),
                SyncPipeline::new(self.store.clone(), false),
                self.jobs.clone(),
                SchedulerConfig::default(),
            )
        }
    }

    #[tokio::test]
    async fn tick_runs_sync_now_connector_to_completion() {
        let fx = Fixture::new();
        let id = fx.actions.create_connector("search-stub", STUB_SERVICE_TYPE).await.unwrap();
        fx.actions
            .update_connector_configuration(&id, json!({"document_count": 5}))
            .await
            .unwrap();
        fx.actions.force_sync(&id).await.unwrap();

        let outcome = fx.scheduler(id.clone()).tick().await.unwrap().unwrap();

        assert_eq!(outcome.report().index_document_count, 5);
        assert!(!outcome.is_failure());

        let settings = fx.actions.load_connector_settings(&id).await.unwrap();
        assert_eq!(settings.last_sync_status, Some(SyncStatus::Completed));
        assert!(!settings.sync_now);
        assert_eq!(fx.store.documents("search-stub").len(), 5);

        let jobs = fx.jobs.fetch_all();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Completed);
        assert_eq!(jobs[0].index_document_count, 5);
        assert!(jobs[0].durable_job_id.is_some());
    }

    #[tokio::test]
    async fn tick_does_nothing_when_not_due() {
        let fx = Fixture::new();
        let id = fx.actions.create_connector("search-stub", STUB_SERVICE_TYPE).await.unwrap();

        assert!(fx.scheduler(id).tick().await.unwrap().is_none());
        assert!(fx.jobs.is_empty());
    }

    #[tokio::test]
    async fn unknown_service_type_is_a_tick_error() {
        let fx = Fixture::new();
        let id = fx.actions.create_connector("search-x", "confluence").await.unwrap();
        fx.actions.force_sync(&id).await.unwrap();

        let err = fx.scheduler(id.clone()).tick().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Registry(RegistryError::UnknownServiceType(_))));

        // Nothing was claimed.
        let settings = fx.actions.load_connector_settings(&id).await.unwrap();
        assert!(settings.sync_now);
        assert_eq!(settings.last_sync_status, None);
    }

    #[tokio::test]
    async fn missing_connector_yields_no_work() {
        let fx = Fixture::new();
        let scheduler = fx.scheduler(ConnectorId::new("ghost").unwrap());
        assert!(scheduler.connector_settings().await.is_empty());
        assert!(scheduler.tick().await.unwrap().is_none());
    }

    /// Every read fails; counts attempts.
    #[derive(Default)]
    struct Unreachable {
        reads: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for Unreachable {
        async fn get(&self, _index: &str, _id: &str) -> Result<Option<JsonValue>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn insert(&self, _index: &str, _document: JsonValue) -> Result<String, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn put(&self, _index: &str, _id: &str, _document: JsonValue) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn update(&self, _index: &str, _id: &str, _patch: JsonValue) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn update_if(
            &self,
            _index: &str,
            _id: &str,
            _precondition: &Precondition,
            _patch: JsonValue,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn delete(&self, _index: &str, _id: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn ensure_index(&self, _index: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn index_exists(&self, _index: &str) -> Result<bool, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn loops_keep_ticking_through_store_outage_and_stop_on_shutdown() {
        let store = Arc::new(Unreachable::default());
        let scheduler = Arc::new(Scheduler::new(
            ConnectorId::new("c1").unwrap(),
            ConnectorActions::new(store.clone()),
            Arc::new(ConnectorRegistry::new()),
            SyncPipeline::new(store.clone(), false),
            InMemoryJobStore::arc(),
            SchedulerConfig {
                poll_interval: Duration::from_millis(10),
                heartbeat_interval: Duration::from_millis(10),
            },
        ));

        let handle = scheduler.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown().await;

        let reads = store.reads.load(Ordering::SeqCst);
        assert!(reads >= 3, "expected repeated poll ticks, saw {reads}");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.reads.load(Ordering::SeqCst), reads);
    }

    /// Fails the first connector write that records a terminal status.
    struct LosesFirstCompletion {
        inner: InMemoryDocumentStore,
        failed: AtomicBool,
    }

    impl LosesFirstCompletion {
        fn new() -> Self {
            Self {
                inner: InMemoryDocumentStore::new(),
                failed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for LosesFirstCompletion {
        async fn get(&self, index: &str, id: &str) -> Result<Option<JsonValue>, StoreError> {
            self.inner.get(index, id).await
        }

        async fn insert(&self, index: &str, document: JsonValue) -> Result<String, StoreError> {
            self.inner.insert(index, document).await
        }

        async fn put(&self, index: &str, id: &str, document: JsonValue) -> Result<(), StoreError> {
            self.inner.put(index, id, document).await
        }

        async fn update(&self, index: &str, id: &str, patch: JsonValue) -> Result<(), StoreError> {
            let terminal = matches!(
                patch["last_sync_status"].as_str(),
                Some("completed") | Some("failed")
            );
            if terminal && !self.failed.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Backend("transient outage".into()));
            }
            self.inner.update(index, id, patch).await
        }

        async fn update_if(
            &self,
            index: &str,
            id: &str,
            precondition: &Precondition,
            patch: JsonValue,
        ) -> Result<bool, StoreError> {
            self.inner.update_if(index, id, precondition, patch).await
        }

        async fn delete(&self, index: &str, id: &str) -> Result<(), StoreError> {
            self.inner.delete(index, id).await
        }

        async fn ensure_index(&self, index: &str) -> Result<(), StoreError> {
            self.inner.ensure_index(index).await
        }

        async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
            self.inner.index_exists(index).await
        }
    }

    fn stub_scheduler(
        store: Arc<dyn DocumentStore>,
        jobs: Arc<InMemoryJobStore>,
        connector_id: ConnectorId,
        config: SchedulerConfig,
    ) -> Scheduler {
        let mut registry = ConnectorRegistry::new();
        registry
            .register(STUB_SERVICE_TYPE, || Arc::new(StubConnector::new()) as Arc<dyn Connector>)
            .unwrap();
        Scheduler::new(
            connector_id,
            ConnectorActions::new(store.clone()),
            Arc::new(registry),
            SyncPipeline::new(store, false),
            jobs,
            config,
        )
    }

    #[tokio::test]
    async fn failed_completion_write_does_not_wedge_the_connector() {
        let store = Arc::new(LosesFirstCompletion::new());
        let jobs = InMemoryJobStore::arc();
        let actions = ConnectorActions::new(store.clone());
        let id = actions.create_connector("search-stub", STUB_SERVICE_TYPE).await.unwrap();
        let scheduler = stub_scheduler(store.clone(), jobs.clone(), id.clone(), SchedulerConfig::default());

        actions.force_sync(&id).await.unwrap();
        let err = scheduler.tick().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Action(ActionError::Store(_))));

        // The run is closed in-process but never reported as a success.
        let lost = jobs.fetch_all();
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].status, JobStatus::Failed);
        assert!(lost[0].error.as_deref().unwrap().contains("transient outage"));
        assert_eq!(
            actions.load_connector_settings(&id).await.unwrap().last_sync_status,
            Some(SyncStatus::InProgress)
        );

        actions.force_sync(&id).await.unwrap();
        let outcome = scheduler.tick().await.unwrap().unwrap();
        assert!(!outcome.is_failure());

        let settings = actions.load_connector_settings(&id).await.unwrap();
        assert_eq!(settings.last_sync_status, Some(SyncStatus::Completed));
        assert!(!settings.sync_now);
        assert_eq!(jobs.len(), 2);
    }

    #[tokio::test]
    async fn claim_with_unfinished_job_is_left_alone() {
        let fx = Fixture::new();
        let id = fx.actions.create_connector("search-stub", STUB_SERVICE_TYPE).await.unwrap();
        let durable = fx.actions.claim_job(&id).await.unwrap();
        let job = fx.jobs.create_job(id.clone());
        fx.jobs
            .update_job(job.id, &mut |j: &mut Job| j.mark_in_progress(durable.clone()))
            .unwrap();
        fx.actions.force_sync(&id).await.unwrap();

        let scheduler = fx.scheduler(id.clone());
        assert!(!scheduler.recover_abandoned_claim().await.unwrap());
        assert!(scheduler.tick().await.unwrap().is_none());

        let settings = fx.actions.load_connector_settings(&id).await.unwrap();
        assert_eq!(settings.last_sync_status, Some(SyncStatus::InProgress));
    }

    #[tokio::test]
    async fn claim_left_by_a_previous_process_is_recovered() {
        let fx = Fixture::new();
        let id = fx.actions.create_connector("search-stub", STUB_SERVICE_TYPE).await.unwrap();
        fx.actions.claim_job(&id).await.unwrap();

        let scheduler = fx.scheduler(id.clone());
        assert!(scheduler.recover_abandoned_claim().await.unwrap());

        let settings = fx.actions.load_connector_settings(&id).await.unwrap();
        assert_eq!(settings.last_sync_status, Some(SyncStatus::Failed));
        assert_eq!(settings.last_sync_error.as_deref(), Some(ABANDONED_CLAIM_ERROR));
    }

    #[tokio::test]
    async fn loop_swallows_completion_failure_and_syncs_on_a_later_tick() {
        let store = Arc::new(LosesFirstCompletion::new());
        let jobs = InMemoryJobStore::arc();
        let actions = ConnectorActions::new(store.clone());
        let id = actions.create_connector("search-stub", STUB_SERVICE_TYPE).await.unwrap();
        store
            .inner
            .update(
                ".docsync-connectors",
                id.as_str(),
                json!({"scheduling": {"enabled": true, "interval": "* * * * * *"}}),
            )
            .await
            .unwrap();

        let handle = Arc::new(stub_scheduler(
            store.clone(),
            jobs.clone(),
            id.clone(),
            SchedulerConfig {
                poll_interval: Duration::from_millis(20),
                heartbeat_interval: Duration::from_secs(60),
            },
        ))
        .spawn();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let settings = actions.load_connector_settings(&id).await.unwrap();
            if settings.last_sync_status == Some(SyncStatus::Completed) {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "connector never synced again");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.shutdown().await;

        assert!(store.failed.load(Ordering::SeqCst));
        let statuses: Vec<JobStatus> = jobs.fetch_all().iter().map(|j| j.status).collect();
        assert!(statuses.contains(&JobStatus::Failed));
        assert!(statuses.contains(&JobStatus::Completed));
    }

    /// Signals when its sync starts, then waits to be released.
    struct Gated {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Connector for Gated {
        fn display_name(&self) -> &str {
            "Gated Source"
        }

        fn service_type(&self) -> &str {
            "gated"
        }

        async fn health_check(&self, _params: &JsonValue) -> Result<(), ConnectorError> {
            Ok(())
        }

        async fn sync(
            &self,
            settings: &ConnectorSettings,
            sink: &dyn Sink,
        ) -> Result<(), ConnectorError> {
            self.started.notify_one();
            self.release.notified().await;
            sink.ingest(Document::new(
                format!("{}-1", settings.id),
                json!({"n": 1}),
            ))
            .await?;
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_waits_for_the_in_flight_run_to_complete() {
        let fx = Fixture::new();
        let id = fx.actions.create_connector("search-gated", "gated").await.unwrap();
        fx.actions.force_sync(&id).await.unwrap();

        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut registry = ConnectorRegistry::new();
        {
            let started = started.clone();
            let release = release.clone();
            registry
                .register("gated", move || {
                    Arc::new(Gated {
                        started: started.clone(),
                        release: release.clone(),
                    }) as Arc<dyn Connector>
                })
                .unwrap();
        }
        let handle = Arc::new(Scheduler::new(
            id.clone(),
            fx.actions.clone(),
            Arc::new(registry),
            SyncPipeline::new(fx.store.clone(), false),
            fx.jobs.clone(),
            SchedulerConfig {
                poll_interval: Duration::from_millis(10),
                heartbeat_interval: Duration::from_secs(60),
            },
        ))
        .spawn();

        tokio::time::timeout(Duration::from_secs(5), started.notified())
            .await
            .expect("sync never started");

        let stopping = tokio::spawn(handle.shutdown());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stopping.is_finished());

        release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), stopping)
            .await
            .expect("shutdown did not return")
            .unwrap();

        let settings = fx.actions.load_connector_settings(&id).await.unwrap();
        assert_eq!(settings.last_sync_status, Some(SyncStatus::Completed));
        assert_eq!(fx.store.documents("search-gated").len(), 1);
        assert_eq!(fx.jobs.fetch_all()[0].status, JobStatus::Completed);
    }
}
