//! Hook capabilities a plugin can opt into.
//!
//! Each lifecycle event kind has its own single-method trait. A plugin
//! advertises the hooks it implements by overriding the matching probe on
//! [`Extension`]; probes it leaves alone return `None` and the registry never
//! calls the plugin for that event kind.

use async_trait::async_trait;
use ctrlplane_core::Event;
use std::sync::Arc;

pub type HookError = Box<dyn std::error::Error + Send + Sync>;
pub type HookResult = Result<(), HookError>;

/// Invoke `$callback!` with one `(Trait, method, probe, emitter, Variant)`
/// tuple per event hook. `Variant` names both the
/// [`EventType`](ctrlplane_core::EventType) and the [`Capability`].
macro_rules! with_event_hooks {
    ($callback:ident) => {
        $callback! {
            (InstanceCreatedHook, on_instance_created, as_instance_created, emit_instance_created, InstanceCreated),
            (InstanceStartedHook, on_instance_started, as_instance_started, emit_instance_started, InstanceStarted),
            (InstanceStoppedHook, on_instance_stopped, as_instance_stopped, emit_instance_stopped, InstanceStopped),
            (InstanceFailedHook, on_instance_failed, as_instance_failed, emit_instance_failed, InstanceFailed),
            (InstanceDeletedHook, on_instance_deleted, as_instance_deleted, emit_instance_deleted, InstanceDeleted),
            (InstanceScaledHook, on_instance_scaled, as_instance_scaled, emit_instance_scaled, InstanceScaled),
            (InstanceSuspendedHook, on_instance_suspended, as_instance_suspended, emit_instance_suspended, InstanceSuspended),
            (InstanceUnsuspendedHook, on_instance_unsuspended, as_instance_unsuspended, emit_instance_unsuspended, InstanceUnsuspended),
            (DeployStartedHook, on_deploy_started, as_deploy_started, emit_deploy_started, DeployStarted),
            (DeploySucceededHook, on_deploy_succeeded, as_deploy_succeeded, emit_deploy_succeeded, DeploySucceeded),
            (DeployFailedHook, on_deploy_failed, as_deploy_failed, emit_deploy_failed, DeployFailed),
            (DeployRolledBackHook, on_deploy_rolled_back, as_deploy_rolled_back, emit_deploy_rolled_back, DeployRolledBack),
            (HealthCheckPassedHook, on_health_check_passed, as_health_check_passed, emit_health_check_passed, HealthCheckPassed),
            (HealthCheckFailedHook, on_health_check_failed, as_health_check_failed, emit_health_check_failed, HealthCheckFailed),
            (HealthDegradedHook, on_health_degraded, as_health_degraded, emit_health_degraded, HealthDegraded),
            (HealthRecoveredHook, on_health_recovered, as_health_recovered, emit_health_recovered, HealthRecovered),
            (DomainAddedHook, on_domain_added, as_domain_added, emit_domain_added, DomainAdded),
            (DomainVerifiedHook, on_domain_verified, as_domain_verified, emit_domain_verified, DomainVerified),
            (DomainRemovedHook, on_domain_removed, as_domain_removed, emit_domain_removed, DomainRemoved),
            (CertProvisionedHook, on_cert_provisioned, as_cert_provisioned, emit_cert_provisioned, CertProvisioned),
            (CertExpiringHook, on_cert_expiring, as_cert_expiring, emit_cert_expiring, CertExpiring),
            (TenantCreatedHook, on_tenant_created, as_tenant_created, emit_tenant_created, TenantCreated),
            (TenantSuspendedHook, on_tenant_suspended, as_tenant_suspended, emit_tenant_suspended, TenantSuspended),
            (TenantDeletedHook, on_tenant_deleted, as_tenant_deleted, emit_tenant_deleted, TenantDeleted),
            (QuotaExceededHook, on_quota_exceeded, as_quota_exceeded, emit_quota_exceeded, QuotaExceeded),
        }
    };
}

pub(crate) use with_event_hooks;

macro_rules! define_hooks {
    ($(($hook:ident, $method:ident, $probe:ident, $emit:ident, $variant:ident)),* $(,)?) => {
        $(
            #[async_trait]
            pub trait $hook: Send + Sync {
                async fn $method(&self, event: &Event) -> HookResult;
            }
        )*

        /// One registrable hook kind
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Capability {
            $($variant,)*
            Shutdown,
        }

        impl Capability {
            pub const ALL: &'static [Capability] =
                &[$(Capability::$variant,)* Capability::Shutdown];

            pub fn hook_name(&self) -> &'static str {
                match self {
                    $(Capability::$variant => stringify!($method),)*
                    Capability::Shutdown => "on_shutdown",
                }
            }
        }

        /// Base trait every plugin implements.
        pub trait Extension: Send + Sync {
            fn name(&self) -> &str;

            $(
                fn $probe(self: Arc<Self>) -> Option<Arc<dyn $hook>> {
                    None
                }
            )*

            fn as_shutdown(self: Arc<Self>) -> Option<Arc<dyn ShutdownHook>> {
                None
            }
        }
    };
}

with_event_hooks!(define_hooks);

/// Called once when the control plane shuts down
#[async_trait]
pub trait ShutdownHook: Send + Sync {
    async fn on_shutdown(&self) -> HookResult;
}
