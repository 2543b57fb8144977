//! Sync pipeline: one connector `sync` invocation, contained.
//!
//! `not_started -> running -> {succeeded, failed}`
//!
//! The pipeline never returns an error. A connector error becomes the
//! report's `error`; a panic anywhere in the run (sink construction included)
//! is caught by the task boundary and reported the same way. Counters live
//! outside the task, so partial progress is reported in both cases.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{info, warn};

use docsync_connectors::{CombinedSink, ConsoleSink, Connector, ConnectorError, Document, Sink, SinkError};
use docsync_core::{ConnectorSettings, SyncOutcome, SyncReport};

use crate::document_store::DocumentStore;
use crate::sink::IndexSink;

#[derive(Debug, Default)]
struct Counters {
    indexed: AtomicU64,
    deleted: AtomicU64,
}

impl Counters {
    fn report(&self) -> SyncReport {
        SyncReport::new(
            self.indexed.load(Ordering::SeqCst),
            self.deleted.load(Ordering::SeqCst),
        )
    }
}

/// Counts fan-out writes that every member accepted.
struct CountingSink {
    inner: CombinedSink,
    counters: Arc<Counters>,
}

#[async_trait]
impl Sink for CountingSink {
    fn name(&self) -> &str {
        "counting"
    }

    async fn ingest(&self, document: Document) -> Result<(), SinkError> {
        self.inner.ingest(document).await?;
        self.counters.indexed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SinkError> {
        self.inner.delete(id).await?;
        self.counters.deleted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.inner.flush().await
    }
}

#[derive(Clone)]
pub struct SyncPipeline {
    store: Arc<dyn DocumentStore>,
    console: bool,
}

impl core::fmt::Debug for SyncPipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyncPipeline")
            .field("console", &self.console)
            .finish()
    }
}

impl SyncPipeline {
    /// `console` adds the console sink ahead of the index sink.
    pub fn new(store: Arc<dyn DocumentStore>, console: bool) -> Self {
        Self { store, console }
    }

    /// Run `connector` once against `settings` and report the outcome.
    pub async fn run(&self, connector: Arc<dyn Connector>, settings: ConnectorSettings) -> SyncOutcome {
        let counters = Arc::new(Counters::default());
        let connector_id = settings.id.clone();
        info!(
            connector_id = %connector_id,
            service_type = connector.service_type(),
            index = %settings.index_name,
            "sync started"
        );

        let task = {
            let counters = counters.clone();
            let store = self.store.clone();
            let console = self.console;
            tokio::spawn(async move {
                let sink = CountingSink {
                    inner: build_sink(store, console, &settings)?,
                    counters,
                };
                connector.sync(&settings, &sink).await
            })
        };

        let result = task.await;
        let mut report = counters.report();
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => report.error = Some(e.to_string()),
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    "sync task was cancelled".to_string()
                };
                report.error = Some(message);
            }
        }

        let outcome = SyncOutcome::from(report);
        match outcome.error() {
            Some(err) => warn!(
                connector_id = %connector_id,
                indexed = outcome.report().index_document_count,
                deleted = outcome.report().deleted_document_count,
                error = %err,
                "sync run failed"
            ),
            None => info!(
                connector_id = %connector_id,
                indexed = outcome.report().index_document_count,
                deleted = outcome.report().deleted_document_count,
                "sync run succeeded"
            ),
        }
        outcome
    }
}

fn build_sink(
    store: Arc<dyn DocumentStore>,
    console: bool,
    settings: &ConnectorSettings,
) -> Result<CombinedSink, ConnectorError> {
    if settings.index_name.trim().is_empty() {
        return Err(SinkError::configuration("index", format!("connector {} has no index_name", settings.id)).into());
    }

    let mut sinks: Vec<Arc<dyn Sink>> = Vec::with_capacity(2);
    if console {
        sinks.push(Arc::new(ConsoleSink::new()));
    }
    sinks.push(Arc::new(IndexSink::new(store, settings.index_name.clone())));
    Ok(CombinedSink::new(sinks))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("sync panicked: {detail}")
}
