//! Audit trail plugin.
//!
//! Turns every lifecycle event into an [`AuditEvent`] and hands it to a
//! [`Recorder`]. Recording failures are logged and swallowed so an audit
//! backend outage never fails a hook.

use crate::features::plugins::hooks::with_event_hooks;
use crate::features::plugins::*;
use async_trait::async_trait;
use ctrlplane_core::Event;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub mod severity {
    pub const INFO: &str = "info";
    pub const WARNING: &str = "warning";
    pub const CRITICAL: &str = "critical";
}

pub mod outcome {
    pub const SUCCESS: &str = "success";
    pub const FAILURE: &str = "failure";
}

pub mod action {
    pub const INSTANCE_CREATED: &str = "ctrlplane.instance.created";
    pub const INSTANCE_STARTED: &str = "ctrlplane.instance.started";
    pub const INSTANCE_STOPPED: &str = "ctrlplane.instance.stopped";
    pub const INSTANCE_FAILED: &str = "ctrlplane.instance.failed";
    pub const INSTANCE_DELETED: &str = "ctrlplane.instance.deleted";
    pub const INSTANCE_SCALED: &str = "ctrlplane.instance.scaled";
    pub const INSTANCE_SUSPENDED: &str = "ctrlplane.instance.suspended";
    pub const INSTANCE_UNSUSPENDED: &str = "ctrlplane.instance.unsuspended";

    pub const DEPLOY_STARTED: &str = "ctrlplane.deploy.started";
    pub const DEPLOY_SUCCEEDED: &str = "ctrlplane.deploy.succeeded";
    pub const DEPLOY_FAILED: &str = "ctrlplane.deploy.failed";
    pub const DEPLOY_ROLLED_BACK: &str = "ctrlplane.deploy.rolled_back";

    pub const HEALTH_CHECK_PASSED: &str = "ctrlplane.health.passed";
    pub const HEALTH_CHECK_FAILED: &str = "ctrlplane.health.failed";
    pub const HEALTH_DEGRADED: &str = "ctrlplane.health.degraded";
    pub const HEALTH_RECOVERED: &str = "ctrlplane.health.recovered";

    pub const DOMAIN_ADDED: &str = "ctrlplane.domain.added";
    pub const DOMAIN_VERIFIED: &str = "ctrlplane.domain.verified";
    pub const DOMAIN_REMOVED: &str = "ctrlplane.domain.removed";
    pub const CERT_PROVISIONED: &str = "ctrlplane.cert.provisioned";
    pub const CERT_EXPIRING: &str = "ctrlplane.cert.expiring";

    pub const TENANT_CREATED: &str = "ctrlplane.tenant.created";
    pub const TENANT_SUSPENDED: &str = "ctrlplane.tenant.suspended";
    pub const TENANT_DELETED: &str = "ctrlplane.tenant.deleted";
    pub const QUOTA_EXCEEDED: &str = "ctrlplane.quota.exceeded";
}

pub mod resource {
    pub const INSTANCE: &str = "instance";
    pub const DEPLOYMENT: &str = "deployment";
    pub const HEALTH_CHECK: &str = "health_check";
    pub const DOMAIN: &str = "domain";
    pub const CERTIFICATE: &str = "certificate";
    pub const TENANT: &str = "tenant";
    pub const QUOTA: &str = "quota";
}

pub mod category {
    pub const INSTANCE: &str = "instance";
    pub const DEPLOY: &str = "deploy";
    pub const HEALTH: &str = "health";
    pub const NETWORK: &str = "network";
    pub const ADMIN: &str = "admin";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub resource: String,
    pub category: String,
    /// Instance ID when the event has one, else the event ID
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub outcome: String,
    pub severity: String,
    /// Copied from the event payload's `error` field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub type RecordError = Box<dyn std::error::Error + Send + Sync>;

/// Audit backend
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), RecordError>;
}

/// Adapter turning a closure into a [`Recorder`]
pub struct RecorderFunc<F>(pub F);

#[async_trait]
impl<F> Recorder for RecorderFunc<F>
where
    F: Fn(&AuditEvent) -> Result<(), RecordError> + Send + Sync,
{
    async fn record(&self, event: &AuditEvent) -> Result<(), RecordError> {
        (self.0)(event)
    }
}

/// Writes audit events to the `audit` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

#[async_trait]
impl Recorder for TracingRecorder {
    async fn record(&self, event: &AuditEvent) -> Result<(), RecordError> {
        let metadata = serde_json::to_string(&event.metadata)?;
        info!(
            target: "audit",
            action = %event.action,
            resource = %event.resource,
            resource_id = %event.resource_id,
            outcome = %event.outcome,
            severity = %event.severity,
            reason = event.reason.as_deref().unwrap_or(""),
            %metadata,
            "Audit event"
        );
        Ok(())
    }
}

/// Keeps every recorded event in memory
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Recorder for MemoryRecorder {
    async fn record(&self, event: &AuditEvent) -> Result<(), RecordError> {
        self.events
            .lock()
            .map_err(|_| "audit buffer lock poisoned")?
            .push(event.clone());
        Ok(())
    }
}

pub struct AuditHook {
    recorder: Arc<dyn Recorder>,
    /// Only these actions are recorded when set
    enabled: Option<HashSet<String>>,
}

impl AuditHook {
    pub const NAME: &'static str = "audit-hook";

    pub fn new(recorder: Arc<dyn Recorder>) -> Self {
        Self {
            recorder,
            enabled: None,
        }
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled = Some(actions.into_iter().map(Into::into).collect());
        self
    }

    fn is_enabled(&self, action: &str) -> bool {
        self.enabled
            .as_ref()
            .map_or(true, |enabled| enabled.contains(action))
    }

    fn build(attributes: &AuditAttributes, event: &Event) -> AuditEvent {
        let mut metadata = Map::new();
        metadata.insert("tenant_id".to_string(), Value::from(event.tenant_id.clone()));
        if let Some(actor_id) = &event.actor_id {
            metadata.insert("actor_id".to_string(), Value::from(actor_id.clone()));
        }
        if let Some(instance_id) = &event.instance_id {
            metadata.insert("instance_id".to_string(), Value::from(instance_id.clone()));
        }
        for (key, value) in &event.payload {
            metadata.insert(key.clone(), value.clone());
        }

        let reason = event.payload.get("error").map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        });

        AuditEvent {
            action: attributes.action.to_string(),
            resource: attributes.resource.to_string(),
            category: attributes.category.to_string(),
            resource_id: event
                .instance_id
                .clone()
                .unwrap_or_else(|| event.event_id.clone()),
            metadata,
            outcome: attributes.outcome.to_string(),
            severity: attributes.severity.to_string(),
            reason,
        }
    }

    async fn record(&self, capability: Capability, event: &Event) -> HookResult {
        let Some(attributes) = audit_attributes(capability) else {
            return Ok(());
        };
        if !self.is_enabled(attributes.action) {
            return Ok(());
        }

        let audit_event = Self::build(&attributes, event);
        if let Err(e) = self.recorder.record(&audit_event).await {
            warn!(
                action = attributes.action,
                resource_id = %audit_event.resource_id,
                error = %e,
                "Failed to record audit event"
            );
        }
        Ok(())
    }
}

/// Fixed audit classification of one hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditAttributes {
    pub action: &'static str,
    pub severity: &'static str,
    pub outcome: &'static str,
    pub resource: &'static str,
    pub category: &'static str,
}

impl AuditAttributes {
    const fn new(
        action: &'static str,
        severity: &'static str,
        outcome: &'static str,
        resource: &'static str,
        category: &'static str,
    ) -> Self {
        Self {
            action,
            severity,
            outcome,
            resource,
            category,
        }
    }
}

/// Audit classification for `capability`, `None` for hooks that are not
/// audited
pub fn audit_attributes(capability: Capability) -> Option<AuditAttributes> {
    use self::{action as a, category as c, outcome as o, resource as r, severity as s};

    let attributes = match capability {
        Capability::InstanceCreated => {
            AuditAttributes::new(a::INSTANCE_CREATED, s::INFO, o::SUCCESS, r::INSTANCE, c::INSTANCE)
        }
        Capability::InstanceStarted => {
            AuditAttributes::new(a::INSTANCE_STARTED, s::INFO, o::SUCCESS, r::INSTANCE, c::INSTANCE)
        }
        Capability::InstanceStopped => {
            AuditAttributes::new(a::INSTANCE_STOPPED, s::INFO, o::SUCCESS, r::INSTANCE, c::INSTANCE)
        }
        Capability::InstanceFailed => AuditAttributes::new(
            a::INSTANCE_FAILED,
            s::CRITICAL,
            o::FAILURE,
            r::INSTANCE,
            c::INSTANCE,
        ),
        Capability::InstanceDeleted => {
            AuditAttributes::new(a::INSTANCE_DELETED, s::INFO, o::SUCCESS, r::INSTANCE, c::INSTANCE)
        }
        Capability::InstanceScaled => {
            AuditAttributes::new(a::INSTANCE_SCALED, s::INFO, o::SUCCESS, r::INSTANCE, c::INSTANCE)
        }
        Capability::InstanceSuspended => AuditAttributes::new(
            a::INSTANCE_SUSPENDED,
            s::WARNING,
            o::SUCCESS,
            r::INSTANCE,
            c::INSTANCE,
        ),
        Capability::InstanceUnsuspended => AuditAttributes::new(
            a::INSTANCE_UNSUSPENDED,
            s::INFO,
            o::SUCCESS,
            r::INSTANCE,
            c::INSTANCE,
        ),
        Capability::DeployStarted => {
            AuditAttributes::new(a::DEPLOY_STARTED, s::INFO, o::SUCCESS, r::DEPLOYMENT, c::DEPLOY)
        }
        Capability::DeploySucceeded => {
            AuditAttributes::new(a::DEPLOY_SUCCEEDED, s::INFO, o::SUCCESS, r::DEPLOYMENT, c::DEPLOY)
        }
        Capability::DeployFailed => AuditAttributes::new(
            a::DEPLOY_FAILED,
            s::CRITICAL,
            o::FAILURE,
            r::DEPLOYMENT,
            c::DEPLOY,
        ),
        Capability::DeployRolledBack => AuditAttributes::new(
            a::DEPLOY_ROLLED_BACK,
            s::WARNING,
            o::SUCCESS,
            r::DEPLOYMENT,
            c::DEPLOY,
        ),
        Capability::HealthCheckPassed => AuditAttributes::new(
            a::HEALTH_CHECK_PASSED,
            s::INFO,
            o::SUCCESS,
            r::HEALTH_CHECK,
            c::HEALTH,
        ),
        Capability::HealthCheckFailed => AuditAttributes::new(
            a::HEALTH_CHECK_FAILED,
            s::CRITICAL,
            o::FAILURE,
            r::HEALTH_CHECK,
            c::HEALTH,
        ),
        Capability::HealthDegraded => AuditAttributes::new(
            a::HEALTH_DEGRADED,
            s::WARNING,
            o::FAILURE,
            r::HEALTH_CHECK,
            c::HEALTH,
        ),
        Capability::HealthRecovered => AuditAttributes::new(
            a::HEALTH_RECOVERED,
            s::INFO,
            o::SUCCESS,
            r::HEALTH_CHECK,
            c::HEALTH,
        ),
        Capability::DomainAdded => {
            AuditAttributes::new(a::DOMAIN_ADDED, s::INFO, o::SUCCESS, r::DOMAIN, c::NETWORK)
        }
        Capability::DomainVerified => {
            AuditAttributes::new(a::DOMAIN_VERIFIED, s::INFO, o::SUCCESS, r::DOMAIN, c::NETWORK)
        }
        Capability::DomainRemoved => {
            AuditAttributes::new(a::DOMAIN_REMOVED, s::INFO, o::SUCCESS, r::DOMAIN, c::NETWORK)
        }
        Capability::CertProvisioned => AuditAttributes::new(
            a::CERT_PROVISIONED,
            s::INFO,
            o::SUCCESS,
            r::CERTIFICATE,
            c::NETWORK,
        ),
        Capability::CertExpiring => AuditAttributes::new(
            a::CERT_EXPIRING,
            s::WARNING,
            o::FAILURE,
            r::CERTIFICATE,
            c::NETWORK,
        ),
        Capability::TenantCreated => {
            AuditAttributes::new(a::TENANT_CREATED, s::INFO, o::SUCCESS, r::TENANT, c::ADMIN)
        }
        Capability::TenantSuspended => {
            AuditAttributes::new(a::TENANT_SUSPENDED, s::WARNING, o::SUCCESS, r::TENANT, c::ADMIN)
        }
        Capability::TenantDeleted => {
            AuditAttributes::new(a::TENANT_DELETED, s::INFO, o::SUCCESS, r::TENANT, c::ADMIN)
        }
        Capability::QuotaExceeded => {
            AuditAttributes::new(a::QUOTA_EXCEEDED, s::WARNING, o::FAILURE, r::QUOTA, c::ADMIN)
        }
        Capability::Shutdown => return None,
    };
    Some(attributes)
}

macro_rules! audit_hooks {
    ($(($hook:ident, $method:ident, $probe:ident, $emit:ident, $variant:ident)),* $(,)?) => {
        impl Extension for AuditHook {
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
            impl $hook for AuditHook {
                async fn $method(&self, event: &Event) -> HookResult {
                    self.record(Capability::$variant, event).await
                }
            }
        )*
    };
}

with_event_hooks!(audit_hooks);
