//! Agent process: wires configuration, the durable store, the connector
//! registry, the job watcher and one scheduler per connector.

pub mod app;

pub use app::{Agent, AgentError, build_store, default_registry};
