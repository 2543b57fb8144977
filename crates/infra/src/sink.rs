//! Document-store destination sink.

use std::sync::Arc;

use async_trait::async_trait;

use docsync_connectors::{Document, Sink, SinkError};

use crate::document_store::DocumentStore;

/// Writes produced documents into one content index of the durable store.
#[derive(Clone)]
pub struct IndexSink {
    store: Arc<dyn DocumentStore>,
    index: String,
}

impl IndexSink {
    pub fn new(store: Arc<dyn DocumentStore>, index: impl Into<String>) -> Self {
        Self {
            store,
            index: index.into(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }
}

impl core::fmt::Debug for IndexSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IndexSink").field("index", &self.index).finish()
    }
}

#[async_trait]
impl Sink for IndexSink {
    fn name(&self) -> &str {
        "index"
    }

    async fn ingest(&self, document: Document) -> Result<(), SinkError> {
        self.store
            .put(&self.index, &document.id, document.body)
            .await
            .map_err(|e| SinkError::write(self.name(), e.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), SinkError> {
        self.store
            .delete(&self.index, id)
            .await
            .map_err(|e| SinkError::write(self.name(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::InMemoryDocumentStore;
    use serde_json::json;

    #[tokio::test]
    async fn ingest_and_delete_write_through_to_the_index() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let sink = IndexSink::new(store.clone(), "search-gitlab");

        sink.ingest_multiple(vec![
            Document::new("a", json!({"title": "A"})),
            Document::new("b", json!({"title": "B"})),
        ])
        .await
        .unwrap();
        sink.delete("a").await.unwrap();

        let docs = store.documents("search-gitlab");
        assert_eq!(docs, vec![("b".to_string(), json!({"title": "B"}))]);
    }
}
