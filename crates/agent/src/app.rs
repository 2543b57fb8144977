use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use docsync_connectors::{Connector, ConnectorRegistry, RegistryError, STUB_SERVICE_TYPE, StubConnector};
use docsync_infra::jobs::WatcherHandle;
use docsync_infra::{
    ActionError, AgentConfig, ConnectorActions, DocumentStore, InMemoryDocumentStore, InMemoryJobStore,
    JobWatcher, PostgresDocumentStore, Scheduler, SchedulerConfig, SchedulerHandle, StoreError,
    SyncPipeline,
};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to start job watcher: {0}")]
    Watcher(#[from] std::io::Error),
}

/// Registry holding the plugins built into the agent.
pub fn default_registry() -> Result<ConnectorRegistry, RegistryError> {
    let mut registry = ConnectorRegistry::new();
    registry.register(STUB_SERVICE_TYPE, || Arc::new(StubConnector::new()) as Arc<dyn Connector>)?;
    Ok(registry)
}

/// Postgres when `database_url` is set, otherwise the in-memory store.
pub async fn build_store(config: &AgentConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresDocumentStore::connect(url).await?;
            info!("using postgres document store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DOCSYNC_DATABASE_URL not set; using in-memory document store");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
    }
}

/// A running agent.
#[derive(Debug)]
pub struct Agent {
    actions: ConnectorActions,
    jobs: Arc<InMemoryJobStore>,
    watcher: WatcherHandle,
    schedulers: Vec<SchedulerHandle>,
}

impl Agent {
    /// Provision indices, start the job watcher and one scheduler per connector.
    ///
    /// Claims left `in_progress` by a previous process are released first.
    pub async fn start(
        config: &AgentConfig,
        store: Arc<dyn DocumentStore>,
        registry: ConnectorRegistry,
    ) -> Result<Self, AgentError> {
        let actions = ConnectorActions::with_indices(
            store.clone(),
            config.connectors_index.clone(),
            config.jobs_index.clone(),
        );
        actions.ensure_connectors_index_exists().await?;
        actions.ensure_jobs_index_exists().await?;

        let registry = Arc::new(registry);
        let pipeline = SyncPipeline::new(store, config.console_sink);
        let jobs = InMemoryJobStore::arc();
        let watcher = JobWatcher::start(jobs.clone(), config.watcher)?;

        let scheduler_config = SchedulerConfig {
            poll_interval: config.poll_interval,
            heartbeat_interval: config.heartbeat_interval,
        };
        let mut schedulers = Vec::with_capacity(config.connector_ids.len());
        for connector_id in &config.connector_ids {
            let scheduler = Arc::new(Scheduler::new(
                connector_id.clone(),
                actions.clone(),
                registry.clone(),
                pipeline.clone(),
                jobs.clone(),
                scheduler_config,
            ));
            // Nothing runs yet, so any claim found here belongs to a previous process.
            if let Err(e) = scheduler.recover_abandoned_claim().await {
                warn!(connector_id = %connector_id, error = %e, "could not check for an abandoned sync claim");
            }
            schedulers.push(scheduler.spawn());
        }

        info!(
            connectors = schedulers.len(),
            plugins = ?registry.service_types(),
            "agent started"
        );
        Ok(Self {
            actions,
            jobs,
            watcher,
            schedulers,
        })
    }

    pub fn actions(&self) -> &ConnectorActions {
        &self.actions
    }

    pub fn jobs(&self) -> &Arc<InMemoryJobStore> {
        &self.jobs
    }

    /// Stop every scheduler (in-flight runs finish), then the watcher.
    pub async fn shutdown(self) {
        for scheduler in self.schedulers {
            scheduler.shutdown().await;
        }

        let watcher = self.watcher;
        if let Err(e) = tokio::task::spawn_blocking(move || watcher.shutdown()).await {
            warn!(error = %e, "job watcher did not stop cleanly");
        }
        info!("agent stopped");
    }
}
