//! Agent configuration, read from `DOCSYNC_*` environment variables.

use std::time::Duration;

use thiserror::Error;

use docsync_core::ConnectorId;

use crate::actions::{DEFAULT_CONNECTORS_INDEX, DEFAULT_JOBS_INDEX};
use crate::jobs::WatcherConfig;

pub const CONNECTOR_IDS_ENV: &str = "DOCSYNC_CONNECTOR_IDS";
pub const POLL_INTERVAL_ENV: &str = "DOCSYNC_POLL_INTERVAL_SECS";
pub const HEARTBEAT_INTERVAL_ENV: &str = "DOCSYNC_HEARTBEAT_INTERVAL_SECS";
pub const DATABASE_URL_ENV: &str = "DOCSYNC_DATABASE_URL";
pub const CONNECTORS_INDEX_ENV: &str = "DOCSYNC_CONNECTORS_INDEX";
pub const JOBS_INDEX_ENV: &str = "DOCSYNC_JOBS_INDEX";
pub const CONSOLE_SINK_ENV: &str = "DOCSYNC_CONSOLE_SINK";
pub const JOB_RETENTION_ENV: &str = "DOCSYNC_JOB_RETENTION_SECS";
pub const JOB_STALL_ENV: &str = "DOCSYNC_JOB_STALL_SECS";
pub const WATCHER_TICK_ENV: &str = "DOCSYNC_WATCHER_TICK_MILLIS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub connector_ids: Vec<ConnectorId>,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub connectors_index: String,
    pub jobs_index: String,
    pub console_sink: bool,
    pub watcher: WatcherConfig,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let raw_ids = get(CONNECTOR_IDS_ENV).ok_or(ConfigError::Missing(CONNECTOR_IDS_ENV))?;
        let connector_ids = raw_ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                ConnectorId::new(id).map_err(|e| ConfigError::invalid(CONNECTOR_IDS_ENV, &raw_ids, e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if connector_ids.is_empty() {
            return Err(ConfigError::invalid(CONNECTOR_IDS_ENV, &raw_ids, "no connector ids listed"));
        }

        let secs = |key: &'static str, default: u64| -> Result<Duration, ConfigError> {
            positive(key, get(key), default).map(Duration::from_secs)
        };

        Ok(Self {
            connector_ids,
            poll_interval: secs(POLL_INTERVAL_ENV, 60)?,
            heartbeat_interval: secs(HEARTBEAT_INTERVAL_ENV, 60)?,
            database_url: get(DATABASE_URL_ENV),
            connectors_index: get(CONNECTORS_INDEX_ENV).unwrap_or_else(|| DEFAULT_CONNECTORS_INDEX.to_string()),
            jobs_index: get(JOBS_INDEX_ENV).unwrap_or_else(|| DEFAULT_JOBS_INDEX.to_string()),
            console_sink: flag(CONSOLE_SINK_ENV, get(CONSOLE_SINK_ENV), true)?,
            watcher: WatcherConfig {
                tick: Duration::from_millis(positive(WATCHER_TICK_ENV, get(WATCHER_TICK_ENV), 1000)?),
                retention: secs(JOB_RETENTION_ENV, 3600)?,
                stall_after: secs(JOB_STALL_ENV, 3600)?,
            },
        })
    }
}

fn positive(var: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(var, &value, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::invalid(var, &value, e.to_string())),
    }
}

fn flag(var: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(_) => Err(ConfigError::invalid(
            var,
            value.as_deref().unwrap_or_default(),
            "expected true or false",
        )),
    }
}
