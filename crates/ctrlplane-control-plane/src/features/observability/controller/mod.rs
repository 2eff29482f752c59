use crate::features::observability::repo::{MetricsResult, ObservabilityRepository};
use crate::features::observability::service::ObservabilityService;
use crate::features::plugins::hooks::with_event_hooks;
use crate::features::plugins::*;
use async_trait::async_trait;
use ctrlplane_core::{Event, EventType};
use std::sync::Arc;

/// Metrics plugin counting every lifecycle event it is notified of
pub struct MetricsExtension {
    service: ObservabilityService,
}

impl MetricsExtension {
    pub const NAME: &'static str = "observability-metrics";

    pub fn new() -> MetricsResult<Self> {
        let repo = Arc::new(ObservabilityRepository::new()?);
        Ok(Self::with_service(ObservabilityService::new(repo)))
    }

    pub fn with_service(service: ObservabilityService) -> Self {
        Self { service }
    }

    /// Listener for [`PluginRegistry::set_failure_listener`] feeding the hook
    /// error counter
    pub fn failure_listener(self: &Arc<Self>) -> HookFailureListener {
        let metrics = Arc::clone(self);
        Arc::new(move |capability: Capability, plugin: &str| {
            metrics
                .service
                .record_hook_failure(capability.hook_name(), plugin);
        })
    }

    pub fn event_count(&self, event_type: EventType) -> u64 {
        self.service.event_count(event_type)
    }

    pub fn hook_failure_count(&self, capability: Capability, plugin: &str) -> u64 {
        self.service
            .hook_failure_count(capability.hook_name(), plugin)
    }

    pub fn active_instances(&self) -> i64 {
        self.service.active_instances()
    }

    pub fn render_metrics(&self) -> MetricsResult<String> {
        self.service.render_metrics()
    }
}

macro_rules! metrics_hooks {
    ($(($hook:ident, $method:ident, $probe:ident, $emit:ident, $variant:ident)),* $(,)?) => {
        impl Extension for MetricsExtension {
            fn name(&self) -> &str {
                Self::NAME
            }

            $(
                fn $probe(self: Arc<Self>) -> Option<Arc<dyn $hook>> {
                    Some(self)
                }
            )*
        }

        $(
            #[async_trait]
            impl $hook for MetricsExtension {
                async fn $method(&self, event: &Event) -> HookResult {
                    self.service.record_event(event);
                    Ok(())
                }
            }
        )*
    };
}

with_event_hooks!(metrics_hooks);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_events_per_type() {
        let metrics = Arc::new(MetricsExtension::new().unwrap());
        let mut registry = PluginRegistry::default();
        registry.register(metrics.clone());

        for event_type in [
            EventType::InstanceCreated,
            EventType::InstanceCreated,
            EventType::InstanceStarted,
            EventType::DeployFailed,
        ] {
            registry
                .handle_event(&Event::new(event_type, "acme"))
                .await
                .unwrap();
        }

        assert_eq!(metrics.event_count(EventType::InstanceCreated), 2);
        assert_eq!(metrics.event_count(EventType::InstanceStarted), 1);
        assert_eq!(metrics.event_count(EventType::DeployFailed), 1);
        assert_eq!(metrics.event_count(EventType::InstanceDeleted), 0);
        assert_eq!(metrics.active_instances(), 2);
    }

    #[tokio::test]
    async fn test_active_instances_drop_on_delete() {
        let metrics = MetricsExtension::new().unwrap();
        metrics
            .on_instance_created(&Event::new(EventType::InstanceCreated, "acme"))
            .await
            .unwrap();
        metrics
            .on_instance_deleted(&Event::new(EventType::InstanceDeleted, "acme"))
            .await
            .unwrap();
        assert_eq!(metrics.active_instances(), 0);
    }

    #[test]
    fn test_registers_every_event_hook() {
        let mut registry = PluginRegistry::default();
        registry.register(Arc::new(MetricsExtension::new().unwrap()));
        assert_eq!(registry.capability_count(Capability::QuotaExceeded), 1);
        assert_eq!(registry.capability_count(Capability::HealthRecovered), 1);
        assert_eq!(registry.capability_count(Capability::Shutdown), 0);
    }

    #[test]
    fn test_failure_listener_feeds_hook_error_counter() {
        let metrics = Arc::new(MetricsExtension::new().unwrap());
        let listener = metrics.failure_listener();
        listener(Capability::InstanceFailed, "audit-hook");
        listener(Capability::InstanceFailed, "audit-hook");

        assert_eq!(
            metrics.hook_failure_count(Capability::InstanceFailed, "audit-hook"),
            2
        );
        let rendered = metrics.render_metrics().unwrap();
        assert!(rendered.contains("ctrlplane_plugin_hook_errors_total"));
        assert!(rendered.contains("plugin=\"audit-hook\""));
    }

    #[tokio::test]
    async fn test_render_contains_lifecycle_counter() {
        let metrics = MetricsExtension::new().unwrap();
        metrics
            .on_instance_scaled(&Event::new(EventType::InstanceScaled, "acme"))
            .await
            .unwrap();
        let rendered = metrics.render_metrics().unwrap();
        assert!(rendered.contains("ctrlplane_lifecycle_events_total{event=\"instance.scaled\"} 1"));
    }
}
