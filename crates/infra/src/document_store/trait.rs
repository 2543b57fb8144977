use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Durable store failure (the persistence error of claim/complete).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("document {id} not found in index {index}")]
    NotFound { index: String, id: String },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("document serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn not_found(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            index: index.into(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Guard evaluated atomically with a conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// Top-level `field` is absent or differs from `value`.
    FieldNotEquals { field: String, value: JsonValue },
    /// Top-level `field` is present and equal to `value`.
    FieldEquals { field: String, value: JsonValue },
}

impl Precondition {
    pub fn field_not_equals(field: impl Into<String>, value: JsonValue) -> Self {
        Self::FieldNotEquals {
            field: field.into(),
            value,
        }
    }

    pub fn field_equals(field: impl Into<String>, value: JsonValue) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value,
        }
    }

    pub fn holds(&self, document: &JsonValue) -> bool {
        match self {
            Precondition::FieldNotEquals { field, value } => document.get(field) != Some(value),
            Precondition::FieldEquals { field, value } => document.get(field) == Some(value),
        }
    }
}

/// Point-access document store holding JSON documents in named indices.
///
/// Operations required by the durable actions: point read, partial update,
/// and insert with a generated id. Writes are not retried by callers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read. `Ok(None)` when the document (or its index) does not exist.
    async fn get(&self, index: &str, id: &str) -> Result<Option<JsonValue>, StoreError>;

    /// Insert a new document and return its generated id.
    async fn insert(&self, index: &str, document: JsonValue) -> Result<String, StoreError>;

    /// Create or replace the document stored under `id`.
    async fn put(&self, index: &str, id: &str, document: JsonValue) -> Result<(), StoreError>;

    /// Deep-merge `patch` into an existing document.
    async fn update(&self, index: &str, id: &str, patch: JsonValue) -> Result<(), StoreError>;

    /// Deep-merge `patch` only if `precondition` holds, as one atomic step.
    ///
    /// Returns `Ok(false)` when the precondition rejected the write.
    async fn update_if(
        &self,
        index: &str,
        id: &str,
        precondition: &Precondition,
        patch: JsonValue,
    ) -> Result<bool, StoreError>;

    /// Remove a document. Deleting an absent document is not an error.
    async fn delete(&self, index: &str, id: &str) -> Result<(), StoreError>;

    async fn ensure_index(&self, index: &str) -> Result<(), StoreError>;

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn get(&self, index: &str, id: &str) -> Result<Option<JsonValue>, StoreError> {
        (**self).get(index, id).await
    }

    async fn insert(&self, index: &str, document: JsonValue) -> Result<String, StoreError> {
        (**self).insert(index, document).await
    }

    async fn put(&self, index: &str, id: &str, document: JsonValue) -> Result<(), StoreError> {
        (**self).put(index, id, document).await
    }

    async fn update(&self, index: &str, id: &str, patch: JsonValue) -> Result<(), StoreError> {
        (**self).update(index, id, patch).await
    }

    async fn update_if(
        &self,
        index: &str,
        id: &str,
        precondition: &Precondition,
        patch: JsonValue,
    ) -> Result<bool, StoreError> {
        (**self).update_if(index, id, precondition, patch).await
    }

    async fn delete(&self, index: &str, id: &str) -> Result<(), StoreError> {
        (**self).delete(index, id).await
    }

    async fn ensure_index(&self, index: &str) -> Result<(), StoreError> {
        (**self).ensure_index(index).await
    }

    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        (**self).index_exists(index).await
    }
}

/// Recursively merge `patch` into `target`.
///
/// Objects merge key by key; any other patch value (including `null`)
/// replaces the target value.
pub fn merge_patch(target: &mut JsonValue, patch: JsonValue) {
    match (target, patch) {
        (JsonValue::Object(target), JsonValue::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge_patch(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
