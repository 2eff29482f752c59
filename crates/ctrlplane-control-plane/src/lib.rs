pub mod features;
pub mod shared;

use crate::features::audit_hook::{AuditHook, Recorder, TracingRecorder};
use crate::features::event_bus::{EventBus, InMemoryEventBus};
use crate::features::instance_management::{
    InMemoryInstanceRepository, InstanceController, InstanceService,
};
use crate::features::observability::MetricsExtension;
use crate::features::plugins::{Extension, PluginRegistry};
use crate::features::providers::{Provider, ProviderRegistry};
use crate::shared::config::ControlPlaneConfig;
use crate::shared::error::ControlPlaneResult;
use std::sync::Arc;
use tracing::info;

/// Assembles a [`ControlPlane`]. Providers and plugins must be added here;
/// the plugin set is frozen once the bus subscription is made.
pub struct ControlPlaneBuilder {
    config: ControlPlaneConfig,
    providers: Vec<(String, Arc<dyn Provider>)>,
    plugins: Vec<Arc<dyn Extension>>,
    audit_recorder: Option<Arc<dyn Recorder>>,
}

impl ControlPlaneBuilder {
    pub fn new(config: ControlPlaneConfig) -> Self {
        Self {
            config,
            providers: Vec::new(),
            plugins: Vec::new(),
            audit_recorder: None,
        }
    }

    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.providers.push((name.into(), provider));
        self
    }

    /// Register an extra plugin after the built-in ones
    pub fn with_plugin(mut self, plugin: Arc<dyn Extension>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Send audit records somewhere other than the `audit` log target
    pub fn with_audit_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.audit_recorder = Some(recorder);
        self
    }

    pub async fn build(self) -> ControlPlaneResult<ControlPlane> {
        let config = self.config;

        let providers = Arc::new(ProviderRegistry::new());
        for (name, provider) in self.providers {
            providers.register(name, provider)?;
        }
        providers.set_default(config.default_provider.clone())?;

        let mut plugins = PluginRegistry::new(config.hook_timeout());
        let metrics = if config.metrics_enabled {
            let metrics = Arc::new(MetricsExtension::new()?);
            plugins.set_failure_listener(metrics.failure_listener());
            plugins.register(metrics.clone());
            Some(metrics)
        } else {
            None
        };
        if config.audit_enabled {
            let recorder = self
                .audit_recorder
                .unwrap_or_else(|| Arc::new(TracingRecorder));
            plugins.register(Arc::new(AuditHook::new(recorder)));
        }
        for plugin in self.plugins {
            plugins.register(plugin);
        }
        let plugins = Arc::new(plugins);

        let events = Arc::new(InMemoryEventBus::new());
        events.subscribe(plugins.clone(), Vec::new()).await?;

        let repo = Arc::new(InMemoryInstanceRepository::new());
        let instances = Arc::new(InstanceService::new(
            repo,
            providers.clone(),
            events.clone(),
            config.clone(),
        ));

        info!(
            node_id = %config.node_id,
            default_provider = %config.default_provider,
            plugins = plugins.extensions().len(),
            "Control plane assembled"
        );

        Ok(ControlPlane {
            config,
            providers,
            events,
            plugins,
            metrics,
            instances,
        })
    }
}

/// Wires the store, provider registry, event bus, plugin registry and
/// instance service together
pub struct ControlPlane {
    config: ControlPlaneConfig,
    providers: Arc<ProviderRegistry>,
    events: Arc<InMemoryEventBus>,
    plugins: Arc<PluginRegistry>,
    metrics: Option<Arc<MetricsExtension>>,
    instances: Arc<InstanceService>,
}

impl ControlPlane {
    pub fn builder(config: ControlPlaneConfig) -> ControlPlaneBuilder {
        ControlPlaneBuilder::new(config)
    }

    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    pub fn instances(&self) -> Arc<InstanceService> {
        self.instances.clone()
    }

    pub fn controller(&self) -> InstanceController {
        InstanceController::new(self.instances.clone())
    }

    /// Providers may be added while running; new instances can target them
    /// immediately.
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn events(&self) -> Arc<dyn EventBus> {
        self.events.clone()
    }

    /// `None` when metrics are disabled
    pub fn metrics(&self) -> Option<&Arc<MetricsExtension>> {
        self.metrics.as_ref()
    }

    /// Notify shutdown hooks, then close the bus
    pub async fn shutdown(&self) {
        info!(node_id = %self.config.node_id, "Shutting down control plane");
        self.plugins.emit_shutdown().await;
        self.events.close().await;
    }
}
