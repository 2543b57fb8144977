//! Process-local document store backed by nested hash maps.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::r#trait::{DocumentStore, Precondition, StoreError, merge_patch};

type Index = HashMap<String, JsonValue>;

/// In-memory document store.
///
/// Intended for tests/dev. Every operation takes the lock once, so
/// `update_if` is atomic with respect to all other operations.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    indices: RwLock<HashMap<String, Index>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous point read (primarily for tests).
    pub fn snapshot(&self, index: &str, id: &str) -> Option<JsonValue> {
        let indices = self.indices.read().unwrap_or_else(PoisonError::into_inner);
        indices.get(index).and_then(|docs| docs.get(id)).cloned()
    }

    /// All documents in an index (primarily for tests).
    pub fn documents(&self, index: &str) -> Vec<(String, JsonValue)> {
        let indices = self.indices.read().unwrap_or_else(PoisonError::into_inner);
        let mut docs: Vec<_> = indices
            .get(index)
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        docs
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, index: &str, id: &str) -> Result<Option<JsonValue>, StoreError> {
        Ok(self.snapshot(index, id))
    }

    async fn insert(&self, index: &str, document: JsonValue) -> Result<String, StoreError> {
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        let docs = indices.entry(index.to_string()).or_default();

        let mut id = Uuid::now_v7().simple().to_string();
        while docs.contains_key(&id) {
            id = Uuid::now_v7().simple().to_string();
        }
        docs.insert(id.clone(), document);
        Ok(id)
    }

    async fn put(&self, index: &str, id: &str, document: JsonValue) -> Result<(), StoreError> {
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        indices
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn update(&self, index: &str, id: &str, patch: JsonValue) -> Result<(), StoreError> {
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        let doc = indices
            .get_mut(index)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(index, id))?;
        merge_patch(doc, patch);
        Ok(())
    }

    async fn update_if(
        &self,
        index: &str,
        id: &str,
        precondition: &Precondition,
        patch: JsonValue,
    ) -> Result<bool, StoreError> {
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        let doc = indices
            .get_mut(index)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(index, id))?;
        if !precondition.holds(doc) {
            return Ok(false);
        }
        merge_patch(doc, patch);
        Ok(true)
    }

    async fn delete(&self, index: &str, id: &str) -> Result<(), StoreError> {
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(docs) = indices.get_mut(index) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn ensure_index(&self, index: &str) -> Result<(), StoreError> {
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        indices.entry(index.to_string()).or_default();
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let indices = self.indices.read().unwrap_or_else(PoisonError::into_inner);
        Ok(indices.contains_key(index))
    }
}
