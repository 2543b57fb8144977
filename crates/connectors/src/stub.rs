//! Built-in connector that generates documents instead of reading a source.

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

use docsync_core::ConnectorSettings;

use crate::connector::{ConfigurableFields, Connector, FieldSchema};
use crate::error::ConnectorError;
use crate::sink::{Document, Sink};

pub const STUB_SERVICE_TYPE: &str = "stub_connector";

const DEFAULT_DOCUMENT_COUNT: u64 = 3;

/// Emits `configuration.document_count` generated documents per sync.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubConnector;

impl StubConnector {
    pub fn new() -> Self {
        Self
    }

    fn document_count(settings: &ConnectorSettings) -> Result<u64, ConnectorError> {
        match settings.config_value("document_count") {
            None | Some(JsonValue::Null) => Ok(DEFAULT_DOCUMENT_COUNT),
            Some(v) => v.as_u64().ok_or_else(|| {
                ConnectorError::InvalidConfiguration(format!(
                    "document_count must be a non-negative integer, got {v}"
                ))
            }),
        }
    }
}

#[async_trait]
impl Connector for StubConnector {
    fn display_name(&self) -> &str {
        "Stub Connector"
    }

    fn service_type(&self) -> &str {
        STUB_SERVICE_TYPE
    }

    fn configurable_fields(&self) -> ConfigurableFields {
        let mut fields = ConfigurableFields::new();
        fields.insert(
            "document_count".to_string(),
            FieldSchema::new("Number of documents to generate").with_value(json!(DEFAULT_DOCUMENT_COUNT)),
        );
        fields
    }

    async fn health_check(&self, _params: &JsonValue) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn sync(
        &self,
        settings: &ConnectorSettings,
        sink: &dyn Sink,
    ) -> Result<(), ConnectorError> {
        let count = Self::document_count(settings)?;
        for n in 1..=count {
            let id = format!("{}-{n}", settings.id);
            sink.ingest(Document::new(
                id,
                json!({
                    "title": format!("Stub document {n}"),
                    "connector_id": settings.id.as_str(),
                }),
            ))
            .await?;
        }
        sink.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use docsync_core::ConnectorId;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Document>>);

    #[async_trait]
    impl Sink for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        async fn ingest(&self, document: Document) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(document);
            Ok(())
        }

        async fn delete(&self, _id: &str) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn settings(configuration: JsonValue) -> ConnectorSettings {
        ConnectorSettings::from_record(
            ConnectorId::new("c1").unwrap(),
            json!({"index_name": "idx", "service_type": STUB_SERVICE_TYPE, "configuration": configuration}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn generates_configured_number_of_documents() {
        let sink = Collect::default();
        StubConnector
            .sync(&settings(json!({"document_count": 5})), &sink)
            .await
            .unwrap();

        let docs = sink.0.lock().unwrap();
        assert_eq!(docs.len(), 5);
        assert_eq!(docs[0].id, "c1-1");
    }

    #[tokio::test]
    async fn defaults_to_three_documents() {
        let sink = Collect::default();
        StubConnector.sync(&settings(json!({})), &sink).await.unwrap();
        assert_eq!(sink.0.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejects_non_numeric_count() {
        let sink = Collect::default();
        let err = StubConnector
            .sync(&settings(json!({"document_count": "many"})), &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfiguration(_)));
    }
}
