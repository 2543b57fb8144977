//! Plugin registry keyed by `service_type`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::connector::Connector;
use crate::error::RegistryError;

/// Constructor for a connector plugin.
pub type ConnectorFactory = Arc<dyn Fn() -> Arc<dyn Connector> + Send + Sync>;

/// Maps a `service_type` key to the plugin that handles it.
///
/// Resolution happens when connector settings are loaded, so one registry is
/// built at process start and shared by every scheduler.
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    factories: HashMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under `service_type`.
    ///
    /// The factory is invoked once to validate the capability contract.
    pub fn register<F>(&mut self, service_type: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Arc<dyn Connector> + Send + Sync + 'static,
    {
        let service_type = service_type.into();
        if self.factories.contains_key(&service_type) {
            return Err(RegistryError::DuplicateServiceType(service_type));
        }

        let probe = factory();
        if probe.display_name().trim().is_empty() {
            return Err(RegistryError::MissingDisplayName(service_type));
        }
        if probe.service_type() != service_type {
            return Err(RegistryError::ServiceTypeMismatch {
                registered: service_type,
                reported: probe.service_type().to_string(),
            });
        }

        tracing::debug!(service_type = %service_type, display_name = probe.display_name(), "registered connector");
        self.factories.insert(service_type, Arc::new(factory));
        Ok(())
    }

    /// Instantiate the plugin for `service_type`.
    pub fn resolve(&self, service_type: &str) -> Result<Arc<dyn Connector>, RegistryError> {
        self.factories
            .get(service_type)
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::UnknownServiceType(service_type.to_string()))
    }

    pub fn contains(&self, service_type: &str) -> bool {
        self.factories.contains_key(service_type)
    }

    /// Registered keys, sorted.
    pub fn service_types(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl core::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("service_types", &self.service_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use crate::sink::Sink;
    use async_trait::async_trait;
    use docsync_core::ConnectorSettings;
    use serde_json::Value as JsonValue;

    struct Named {
        display_name: &'static str,
        service_type: &'static str,
    }

    #[async_trait]
    impl Connector for Named {
        fn display_name(&self) -> &str {
            self.display_name
        }

        fn service_type(&self) -> &str {
            self.service_type
        }

        async fn health_check(&self, _params: &JsonValue) -> Result<(), ConnectorError> {
            Ok(())
        }

        async fn sync(
            &self,
            _settings: &ConnectorSettings,
            _sink: &dyn Sink,
        ) -> Result<(), ConnectorError> {
            Ok(())
        }
    }

    fn named(display_name: &'static str, service_type: &'static str) -> impl Fn() -> Arc<dyn Connector> {
        move || {
            Arc::new(Named {
                display_name,
                service_type,
            }) as Arc<dyn Connector>
        }
    }

    #[test]
    fn resolves_registered_plugin() {
        let mut registry = ConnectorRegistry::new();
        registry.register("gitlab", named("GitLab", "gitlab")).unwrap();

        let connector = registry.resolve("gitlab").unwrap();
        assert_eq!(connector.display_name(), "GitLab");
        assert_eq!(registry.service_types(), vec!["gitlab"]);
    }

    #[test]
    fn unknown_service_type_is_an_error() {
        let registry = ConnectorRegistry::new();
        assert_eq!(
            registry.resolve("confluence").err(),
            Some(RegistryError::UnknownServiceType("confluence".into()))
        );
    }

    #[test]
    fn plugin_without_display_name_is_rejected_at_registration() {
        let mut registry = ConnectorRegistry::new();
        let err = registry.register("broken", named("", "broken")).unwrap_err();
        assert_eq!(err, RegistryError::MissingDisplayName("broken".into()));
        assert!(!registry.contains("broken"));
    }

    #[test]
    fn mismatched_and_duplicate_keys_are_rejected() {
        let mut registry = ConnectorRegistry::new();
        assert!(matches!(
            registry.register("a", named("A", "b")),
            Err(RegistryError::ServiceTypeMismatch { .. })
        ));
        registry.register("a", named("A", "a")).unwrap();
        assert_eq!(
            registry.register("a", named("A", "a")),
            Err(RegistryError::DuplicateServiceType("a".into()))
        );
    }
}
