//! Destination sinks and the fan-out that composes them.
//!
//! A connector writes to exactly one logical [`Sink`]. The sync pipeline hands
//! it a [`CombinedSink`] that replicates every operation to each member in
//! order. Replication is best-effort and fail-fast: the first member error is
//! returned to the caller and later members are not written for that call.
//! There is no rollback of members that already accepted the write.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::error::SinkError;

/// One produced record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable id in the destination index.
    pub id: String,
    pub body: JsonValue,
}

impl Document {
    pub fn new(id: impl Into<String>, body: JsonValue) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }
}

/// A destination for produced records.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in errors and logs.
    fn name(&self) -> &str;

    async fn ingest(&self, document: Document) -> Result<(), SinkError>;

    async fn ingest_multiple(&self, documents: Vec<Document>) -> Result<(), SinkError> {
        for document in documents {
            self.ingest(document).await?;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SinkError>;

    async fn delete_multiple(&self, ids: &[String]) -> Result<(), SinkError> {
        for id in ids {
            self.delete(id).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Telemetry sink: logs every operation as a structured tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn ingest(&self, document: Document) -> Result<(), SinkError> {
        info!(target: "docsync::console_sink", id = %document.id, body = %document.body, "ingest");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SinkError> {
        info!(target: "docsync::console_sink", id = %id, "delete");
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        info!(target: "docsync::console_sink", "flush");
        Ok(())
    }
}

/// Ordered fan-out over member sinks.
#[derive(Clone, Default)]
pub struct CombinedSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl CombinedSink {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn Sink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl core::fmt::Debug for CombinedSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.sinks.iter().map(|s| s.name()))
            .finish()
    }
}

#[async_trait]
impl Sink for CombinedSink {
    fn name(&self) -> &str {
        "combined"
    }

    async fn ingest(&self, document: Document) -> Result<(), SinkError> {
        for sink in &self.sinks {
            sink.ingest(document.clone()).await?;
        }
        Ok(())
    }

    async fn ingest_multiple(&self, documents: Vec<Document>) -> Result<(), SinkError> {
        for sink in &self.sinks {
            sink.ingest_multiple(documents.clone()).await?;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SinkError> {
        for sink in &self.sinks {
            sink.delete(id).await?;
        }
        Ok(())
    }

    async fn delete_multiple(&self, ids: &[String]) -> Result<(), SinkError> {
        for sink in &self.sinks {
            sink.delete_multiple(ids).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        for sink in &self.sinks {
            sink.flush().await?;
        }
        Ok(())
    }
}
