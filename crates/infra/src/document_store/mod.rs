//! Durable document store boundary.
//!
//! The connectors index, the sync jobs index and every content index live
//! behind this abstraction. Backends: in-memory (tests/dev) and Postgres.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use r#trait::{DocumentStore, Precondition, StoreError, merge_patch};
