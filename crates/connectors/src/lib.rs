//! `docsync-connectors`
//!
//! **Responsibility:** the plugin boundary.
//!
//! - `Connector`: capability contract every source plugin implements.
//! - `Sink` / `CombinedSink`: destinations a sync writes to, and their fan-out.
//! - `ConnectorRegistry`: `service_type` → plugin constructor.
//!
//! This crate knows nothing about durable state or scheduling.

pub mod connector;
pub mod error;
pub mod registry;
pub mod sink;
pub mod stub;

pub use connector::{ConfigurableFields, Connector, FieldSchema, SourceHealth, SourceStatus};
pub use error::{ConnectorError, RegistryError, SinkError};
pub use registry::{ConnectorFactory, ConnectorRegistry};
pub use sink::{CombinedSink, ConsoleSink, Document, Sink};
pub use stub::{STUB_SERVICE_TYPE, StubConnector};
