use crate::features::providers::Provider;
use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Named providers with an optional fallback. Thread-safe.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
    fallback: RwLock<Option<String>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> ControlPlaneResult<()> {
        let mut providers = self.providers.write().map_err(|_| {
            ControlPlaneError::StorageError("Provider registry lock poisoned".to_string())
        })?;
        providers.insert(name.into(), provider);
        Ok(())
    }

    pub fn get(&self, name: &str) -> ControlPlaneResult<Arc<dyn Provider>> {
        let providers = self.providers.read().map_err(|_| {
            ControlPlaneError::StorageError("Provider registry lock poisoned".to_string())
        })?;
        providers
            .get(name)
            .cloned()
            .ok_or_else(|| ControlPlaneError::ProviderNotFound(name.to_string()))
    }

    pub fn set_default(&self, name: impl Into<String>) -> ControlPlaneResult<()> {
        let mut fallback = self.fallback.write().map_err(|_| {
            ControlPlaneError::StorageError("Provider registry lock poisoned".to_string())
        })?;
        *fallback = Some(name.into());
        Ok(())
    }

    /// Resolve the fallback provider, `ProviderNotFound` if unset or unregistered
    pub fn default_provider(&self) -> ControlPlaneResult<(String, Arc<dyn Provider>)> {
        let name = self
            .fallback
            .read()
            .map_err(|_| {
                ControlPlaneError::StorageError("Provider registry lock poisoned".to_string())
            })?
            .clone()
            .ok_or_else(|| {
                ControlPlaneError::ProviderNotFound("no default provider configured".to_string())
            })?;
        let provider = self.get(&name)?;
        Ok((name, provider))
    }

    /// Resolve `name` when given, else the fallback
    pub fn resolve(&self, name: Option<&str>) -> ControlPlaneResult<(String, Arc<dyn Provider>)> {
        match name {
            Some(name) if !name.is_empty() => Ok((name.to_string(), self.get(name)?)),
            _ => self.default_provider(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        match self.providers.read() {
            Ok(providers) => {
                let mut names: Vec<String> = providers.keys().cloned().collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::providers::InMemoryProvider;

    fn registry_with(names: &[&str]) -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        for name in names {
            registry
                .register(*name, Arc::new(InMemoryProvider::new(*name)))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_get_registered_provider() {
        let registry = registry_with(&["local"]);
        let provider = registry.get("local").unwrap();
        assert_eq!(provider.info().name, "local");
    }

    #[test]
    fn test_get_unknown_provider() {
        let registry = registry_with(&["local"]);
        let err = registry.get("k8s").err().unwrap();
        assert!(matches!(err, ControlPlaneError::ProviderNotFound(name) if name == "k8s"));
    }

    #[test]
    fn test_default_provider_unset() {
        let registry = registry_with(&["local"]);
        assert!(matches!(
            registry.default_provider(),
            Err(ControlPlaneError::ProviderNotFound(_))
        ));
    }

    #[test]
    fn test_default_provider_points_at_unregistered_name() {
        let registry = registry_with(&["local"]);
        registry.set_default("docker").unwrap();
        assert!(matches!(
            registry.resolve(None),
            Err(ControlPlaneError::ProviderNotFound(name)) if name == "docker"
        ));
    }

    #[test]
    fn test_resolve_prefers_named_provider() {
        let registry = registry_with(&["local", "docker"]);
        registry.set_default("local").unwrap();

        let (name, _) = registry.resolve(Some("docker")).unwrap();
        assert_eq!(name, "docker");

        let (name, _) = registry.resolve(None).unwrap();
        assert_eq!(name, "local");

        let (name, _) = registry.resolve(Some("")).unwrap();
        assert_eq!(name, "local");
    }

    #[test]
    fn test_names_sorted() {
        let registry = registry_with(&["vm", "docker", "local"]);
        assert_eq!(registry.names(), vec!["docker", "local", "vm"]);
    }
}
