//! Connector capability contract and the status payload derived from it.

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use docsync_core::ConnectorSettings;

use crate::error::ConnectorError;
use crate::sink::Sink;

/// Schema of one user-configurable field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

impl FieldSchema {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: JsonValue) -> Self {
        self.value = Some(value);
        self
    }
}

pub type ConfigurableFields = BTreeMap<String, FieldSchema>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceHealth {
    Ok,
    Failure,
}

/// Result of [`Connector::source_status`], serialized as
/// `{"status": "OK"|"FAILURE", "statusCode": <int>, "message": <string>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub status: SourceHealth,
    pub status_code: u16,
    pub message: String,
}

impl SourceStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: SourceHealth::Ok,
            status_code: 200,
            message: message.into(),
        }
    }

    pub fn failure(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status: SourceHealth::Failure,
            status_code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == SourceHealth::Ok
    }
}

/// A source plugin that pulls data from one external system type.
///
/// Implementations own no knowledge of durability or scheduling: `sync` only
/// reads from the source and writes to the sink it is handed.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Human-readable name. Must be non-empty; the registry rejects plugins
    /// that return an empty name.
    fn display_name(&self) -> &str;

    /// Registry key of this connector type.
    fn service_type(&self) -> &str;

    fn configurable_fields(&self) -> ConfigurableFields {
        ConfigurableFields::new()
    }

    /// Verify the source is reachable with the given parameters.
    async fn health_check(&self, params: &JsonValue) -> Result<(), ConnectorError>;

    /// Pull data from the source and write it to `sink`.
    async fn sync(
        &self,
        settings: &ConnectorSettings,
        sink: &dyn Sink,
    ) -> Result<(), ConnectorError>;

    /// Health check folded into a status payload; never returns an error.
    ///
    /// A panicking health check is reported as a `500` failure.
    async fn source_status(&self, params: &JsonValue) -> SourceStatus {
        match CatchUnwind(self.health_check(params)).await {
            Ok(Ok(())) => SourceStatus::ok(format!("Connected to {}", self.display_name())),
            Ok(Err(e)) => SourceStatus::failure(e.status_code().unwrap_or(500), e.to_string()),
            Err(payload) => SourceStatus::failure(
                500,
                format!("health check panicked: {}", panic_message(payload.as_ref())),
            ),
        }
    }
}

/// Polls `F`, turning a panic inside `poll` into `Err(payload)`.
struct CatchUnwind<F>(F);

impl<F: Future + Unpin> Future for CatchUnwind<F> {
    type Output = Result<F::Output, Box<dyn Any + Send>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.0;
        match panic::catch_unwind(AssertUnwindSafe(|| Pin::new(inner).poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Err(payload) => Poll::Ready(Err(payload)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
