//! Connector settings (the connector-registry record, read-only to the core).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{DomainError, DomainResult};
use crate::id::ConnectorId;
use crate::sync::SyncStatus;

/// Scheduling block of a connector record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheduling {
    #[serde(default)]
    pub enabled: bool,
    /// Cron expression (seconds-first, e.g. `0 0 * * * *`).
    #[serde(default)]
    pub interval: Option<String>,
}

/// Decoded connector-registry record.
///
/// Mutated exclusively through the durable actions; this type is a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorSettings {
    pub id: ConnectorId,
    pub index_name: String,
    pub service_type: String,
    pub configuration: JsonValue,
    pub scheduling: Scheduling,
    pub sync_now: bool,
    pub last_sync_status: Option<SyncStatus>,
    pub last_sync_error: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ConnectorRecord {
    #[serde(default)]
    index_name: String,
    #[serde(default)]
    service_type: String,
    #[serde(default)]
    configuration: Option<JsonValue>,
    #[serde(default)]
    scheduling: Scheduling,
    #[serde(default)]
    sync_now: bool,
    #[serde(default)]
    last_sync_status: Option<SyncStatus>,
    #[serde(default)]
    last_sync_error: Option<String>,
    #[serde(default)]
    last_synced: Option<DateTime<Utc>>,
    #[serde(default)]
    last_seen: Option<DateTime<Utc>>,
}

impl ConnectorSettings {
    /// Decode a stored connector record.
    ///
    /// Missing optional fields take their defaults; a null `configuration`
    /// becomes an empty object.
    pub fn from_record(id: ConnectorId, record: JsonValue) -> DomainResult<Self> {
        let record: ConnectorRecord = serde_json::from_value(record).map_err(|e| {
            DomainError::validation(format!("connector record {id} is malformed: {e}"))
        })?;

        let configuration = match record.configuration {
            Some(JsonValue::Null) | None => JsonValue::Object(Default::default()),
            Some(v) => v,
        };

        Ok(Self {
            id,
            index_name: record.index_name,
            service_type: record.service_type,
            configuration,
            scheduling: record.scheduling,
            sync_now: record.sync_now,
            last_sync_status: record.last_sync_status,
            last_sync_error: record.last_sync_error,
            last_synced: record.last_synced,
            last_seen: record.last_seen,
        })
    }

    pub fn is_in_progress(&self) -> bool {
        self.last_sync_status == Some(SyncStatus::InProgress)
    }

    /// Look up a configuration value by key.
    pub fn config_value(&self, key: &str) -> Option<&JsonValue> {
        self.configuration.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id() -> ConnectorId {
        ConnectorId::new("conn-1").unwrap()
    }

    #[test]
    fn decodes_full_record() {
        let settings = ConnectorSettings::from_record(
            id(),
            json!({
                "index_name": "search-docs",
                "service_type": "stub_connector",
                "configuration": {"document_count": 5},
                "scheduling": {"enabled": true, "interval": "0 0 * * * *"},
                "sync_now": true,
                "last_sync_status": "completed",
                "last_synced": "2024-05-01T10:00:00Z"
            }),
        )
        .unwrap();

        assert_eq!(settings.index_name, "search-docs");
        assert!(settings.scheduling.enabled);
        assert_eq!(settings.scheduling.interval.as_deref(), Some("0 0 * * * *"));
        assert!(settings.sync_now);
        assert_eq!(settings.last_sync_status, Some(SyncStatus::Completed));
        assert_eq!(settings.config_value("document_count"), Some(&json!(5)));
        assert!(!settings.is_in_progress());
    }

    #[test]
    fn sparse_record_takes_defaults() {
        let settings =
            ConnectorSettings::from_record(id(), json!({"configuration": null})).unwrap();
        assert!(!settings.scheduling.enabled);
        assert!(!settings.sync_now);
        assert_eq!(settings.configuration, json!({}));
        assert!(settings.last_synced.is_none());
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        let err = ConnectorSettings::from_record(id(), json!({"last_sync_status": "weird"}))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
