use thiserror::Error;

/// Failure raised by a connector plugin.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The source could not be reached or rejected the credentials.
    #[error("{message}")]
    HealthCheck {
        message: String,
        status_code: Option<u16>,
    },

    #[error("{0}")]
    Sync(String),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConnectorError {
    pub fn health_check(message: impl Into<String>) -> Self {
        Self::HealthCheck {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn health_check_with_code(message: impl Into<String>, status_code: u16) -> Self {
        Self::HealthCheck {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync(message.into())
    }

    /// Status code carried by a health-check failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ConnectorError::HealthCheck { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

/// Failure writing to a destination sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink {sink} rejected write: {message}")]
    Write { sink: String, message: String },

    #[error("sink {sink} is misconfigured: {message}")]
    Configuration { sink: String, message: String },
}

impl SinkError {
    pub fn write(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            sink: sink.into(),
            message: message.into(),
        }
    }

    pub fn configuration(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

/// Plugin registry failures.
///
/// `MissingDisplayName` and `ServiceTypeMismatch` are programming errors in a
/// plugin and are surfaced at registration time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no connector registered for service type {0:?}")]
    UnknownServiceType(String),

    #[error("connector registered as {0:?} does not implement display_name")]
    MissingDisplayName(String),

    #[error("connector registered as {registered:?} reports service type {reported:?}")]
    ServiceTypeMismatch { registered: String, reported: String },

    #[error("service type {0:?} is already registered")]
    DuplicateServiceType(String),
}
