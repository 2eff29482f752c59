use crate::features::event_bus::{EventBusResult, EventHandler};
use crate::features::plugins::hooks::*;
use crate::shared::config::DEFAULT_HOOK_TIMEOUT_MS;
use async_trait::async_trait;
use ctrlplane_core::{Event, EventType};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Called with the capability and plugin name of every hook that errors or
/// times out
pub type HookFailureListener = Arc<dyn Fn(Capability, &str) + Send + Sync>;

macro_rules! define_hook_table {
    ($(($hook:ident, $method:ident, $probe:ident, $emit:ident, $variant:ident)),* $(,)?) => {
        /// Per-capability hook lists in registration order
        #[derive(Default)]
        struct HookTable {
            $($method: Vec<(String, Arc<dyn $hook>)>,)*
            on_shutdown: Vec<(String, Arc<dyn ShutdownHook>)>,
        }

        impl HookTable {
            fn register(&mut self, plugin: &Arc<dyn Extension>) {
                let name = plugin.name().to_string();
                $(
                    if let Some(hook) = Arc::clone(plugin).$probe() {
                        self.$method.push((name.clone(), hook));
                    }
                )*
                if let Some(hook) = Arc::clone(plugin).as_shutdown() {
                    self.on_shutdown.push((name, hook));
                }
            }

            fn count(&self, capability: Capability) -> usize {
                match capability {
                    $(Capability::$variant => self.$method.len(),)*
                    Capability::Shutdown => self.on_shutdown.len(),
                }
            }
        }

        impl PluginRegistry {
            $(
                pub async fn $emit(&self, event: &Event) {
                    for (plugin, hook) in &self.hooks.$method {
                        self.guard(Capability::$variant, plugin, hook.$method(event))
                            .await;
                    }
                }
            )*
        }
    };
}

with_event_hooks!(define_hook_table);

/// Fans lifecycle events out to registered plugins.
///
/// Plugins are registered up front through `&mut self`; the registry is then
/// shared behind an `Arc` and only read. Hook failures are logged and never
/// reach the caller.
pub struct PluginRegistry {
    extensions: Vec<Arc<dyn Extension>>,
    hooks: HookTable,
    hook_timeout: Duration,
    failure_listener: Option<HookFailureListener>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_HOOK_TIMEOUT_MS))
    }
}

impl PluginRegistry {
    pub fn new(hook_timeout: Duration) -> Self {
        Self {
            extensions: Vec::new(),
            hooks: HookTable::default(),
            hook_timeout,
            failure_listener: None,
        }
    }

    pub fn set_failure_listener(&mut self, listener: HookFailureListener) {
        self.failure_listener = Some(listener);
    }

    /// Probe every capability of `plugin` once and record the ones it has
    pub fn register(&mut self, plugin: Arc<dyn Extension>) {
        self.hooks.register(&plugin);
        info!(plugin = plugin.name(), "Plugin registered");
        self.extensions.push(plugin);
    }

    pub fn extensions(&self) -> &[Arc<dyn Extension>] {
        &self.extensions
    }

    pub fn capability_count(&self, capability: Capability) -> usize {
        self.hooks.count(capability)
    }

    pub fn hook_timeout(&self) -> Duration {
        self.hook_timeout
    }

    /// Route `event` to the emitter for its type. Unknown types are dropped.
    pub async fn handle_event(&self, event: &Event) -> EventBusResult<()> {
        match event.event_type {
            EventType::InstanceCreated => self.emit_instance_created(event).await,
            EventType::InstanceStarted => self.emit_instance_started(event).await,
            EventType::InstanceStopped => self.emit_instance_stopped(event).await,
            EventType::InstanceFailed => self.emit_instance_failed(event).await,
            EventType::InstanceDeleted => self.emit_instance_deleted(event).await,
            EventType::InstanceScaled => self.emit_instance_scaled(event).await,
            EventType::InstanceSuspended => self.emit_instance_suspended(event).await,
            EventType::InstanceUnsuspended => self.emit_instance_unsuspended(event).await,
            EventType::DeployStarted => self.emit_deploy_started(event).await,
            EventType::DeploySucceeded => self.emit_deploy_succeeded(event).await,
            EventType::DeployFailed => self.emit_deploy_failed(event).await,
            EventType::DeployRolledBack => self.emit_deploy_rolled_back(event).await,
            EventType::HealthCheckPassed => self.emit_health_check_passed(event).await,
            EventType::HealthCheckFailed => self.emit_health_check_failed(event).await,
            EventType::HealthDegraded => self.emit_health_degraded(event).await,
            EventType::HealthRecovered => self.emit_health_recovered(event).await,
            EventType::DomainAdded => self.emit_domain_added(event).await,
            EventType::DomainVerified => self.emit_domain_verified(event).await,
            EventType::DomainRemoved => self.emit_domain_removed(event).await,
            EventType::CertProvisioned => self.emit_cert_provisioned(event).await,
            EventType::CertExpiring => self.emit_cert_expiring(event).await,
            EventType::TenantCreated => self.emit_tenant_created(event).await,
            EventType::TenantSuspended => self.emit_tenant_suspended(event).await,
            EventType::TenantDeleted => self.emit_tenant_deleted(event).await,
            EventType::QuotaExceeded => self.emit_quota_exceeded(event).await,
            EventType::Unknown => {
                debug!(event_id = %event.event_id, "Dropping event of unknown type");
            }
        }
        Ok(())
    }

    pub async fn emit_shutdown(&self) {
        for (plugin, hook) in &self.hooks.on_shutdown {
            self.guard(Capability::Shutdown, plugin, hook.on_shutdown())
                .await;
        }
    }

    /// Await one hook call under the hook timeout, logging any failure
    async fn guard<F>(&self, capability: Capability, plugin: &str, call: F)
    where
        F: Future<Output = HookResult>,
    {
        let failed = match tokio::time::timeout(self.hook_timeout, call).await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                warn!(
                    hook = capability.hook_name(),
                    plugin = %plugin,
                    error = %e,
                    "Plugin hook failed"
                );
                true
            }
            Err(_) => {
                warn!(
                    hook = capability.hook_name(),
                    plugin = %plugin,
                    error = "timed out",
                    timeout_ms = self.hook_timeout.as_millis() as u64,
                    "Plugin hook failed"
                );
                true
            }
        };

        if failed {
            if let Some(listener) = &self.failure_listener {
                listener(capability, plugin);
            }
        }
    }
}

#[async_trait]
impl EventHandler for PluginRegistry {
    async fn handle(&self, event: &Event) -> EventBusResult<()> {
        self.handle_event(event).await
    }
}
