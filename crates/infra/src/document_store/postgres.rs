//! Postgres-backed document store.
//!
//! Documents live in a single `docsync_documents` table keyed by
//! `(index_name, id)` with a `jsonb` body. Index names are tracked in
//! `docsync_indices` so `index_exists` answers for empty indices too; `insert`
//! and `put` register their index in the same transaction as the write.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database (any code) | `Backend` |
//! | PoolClosed | `Backend` |
//! | ColumnDecode / Decode | `Serialization` |
//! | Other | `Backend` |
//!
//! Conditional updates run inside a transaction that locks the row with
//! `SELECT ... FOR UPDATE`, so the precondition check and the write are
//! observed atomically by concurrent claimers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use super::r#trait::{DocumentStore, Precondition, StoreError, merge_patch};

const REGISTER_INDEX_SQL: &str =
    "INSERT INTO docsync_indices (name) VALUES ($1) ON CONFLICT (name) DO NOTHING";

#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and create the backing tables if they are missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS docsync_indices (
                name TEXT PRIMARY KEY
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_indices_table", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS docsync_documents (
                index_name TEXT NOT NULL,
                id TEXT NOT NULL,
                body JSONB NOT NULL,
                PRIMARY KEY (index_name, id)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_documents_table", e))?;

        Ok(())
    }

    async fn lock_document(
        tx: &mut Transaction<'_, Postgres>,
        index: &str,
        id: &str,
    ) -> Result<JsonValue, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT body FROM docsync_documents
            WHERE index_name = $1 AND id = $2
            FOR UPDATE
            "#,
        )
        .bind(index)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_document", e))?
        .ok_or_else(|| StoreError::not_found(index, id))?;

        row.try_get::<JsonValue, _>("body")
            .map_err(|e| map_sqlx_error("decode_body", e))
    }

    /// Writes create their index implicitly, as the in-memory store does.
    async fn register_index(tx: &mut Transaction<'_, Postgres>, index: &str) -> Result<(), StoreError> {
        sqlx::query(REGISTER_INDEX_SQL)
            .bind(index)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("register_index", e))?;
        Ok(())
    }

    async fn write_body(
        tx: &mut Transaction<'_, Postgres>,
        index: &str,
        id: &str,
        body: JsonValue,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE docsync_documents SET body = $3 WHERE index_name = $1 AND id = $2")
            .bind(index)
            .bind(id)
            .bind(body)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_document", e))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self))]
    async fn get(&self, index: &str, id: &str) -> Result<Option<JsonValue>, StoreError> {
        let row = sqlx::query("SELECT body FROM docsync_documents WHERE index_name = $1 AND id = $2")
            .bind(index)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_document", e))?;

        row.map(|row| row.try_get::<JsonValue, _>("body"))
            .transpose()
            .map_err(|e| map_sqlx_error("decode_body", e))
    }

    #[instrument(skip(self, document))]
    async fn insert(&self, index: &str, document: JsonValue) -> Result<String, StoreError> {
        let id = Uuid::now_v7().simple().to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        Self::register_index(&mut tx, index).await?;
        sqlx::query("INSERT INTO docsync_documents (index_name, id, body) VALUES ($1, $2, $3)")
            .bind(index)
            .bind(&id)
            .bind(document)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_document", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(id)
    }

    #[instrument(skip(self, document))]
    async fn put(&self, index: &str, id: &str, document: JsonValue) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        Self::register_index(&mut tx, index).await?;
        sqlx::query(
            r#"
            INSERT INTO docsync_documents (index_name, id, body) VALUES ($1, $2, $3)
            ON CONFLICT (index_name, id) DO UPDATE SET body = EXCLUDED.body
            "#,
        )
        .bind(index)
        .bind(id)
        .bind(document)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("put_document", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, index: &str, id: &str, patch: JsonValue) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut body = Self::lock_document(&mut tx, index, id).await?;
        merge_patch(&mut body, patch);
        Self::write_body(&mut tx, index, id, body).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self, precondition, patch))]
    async fn update_if(
        &self,
        index: &str,
        id: &str,
        precondition: &Precondition,
        patch: JsonValue,
    ) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut body = Self::lock_document(&mut tx, index, id).await?;
        if !precondition.holds(&body) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(false);
        }

        merge_patch(&mut body, patch);
        Self::write_body(&mut tx, index, id, body).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn delete(&self, index: &str, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM docsync_documents WHERE index_name = $1 AND id = $2")
            .bind(index)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_document", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn ensure_index(&self, index: &str) -> Result<(), StoreError> {
        sqlx::query(REGISTER_INDEX_SQL)
            .bind(index)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_index", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 AS present FROM docsync_indices WHERE name = $1")
            .bind(index)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("index_exists", e))?;
        Ok(row.is_some())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => StoreError::Backend(format!(
            "database error in {}: {} (code {})",
            operation,
            db_err.message(),
            db_err.code().as_deref().unwrap_or("none")
        )),
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(format!("decode failed in {}: {}", operation, err))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
