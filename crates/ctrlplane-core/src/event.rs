use crate::{new_id, IdPrefix};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of lifecycle fact carried by an [`Event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "instance.created")]
    InstanceCreated,
    #[serde(rename = "instance.started")]
    InstanceStarted,
    #[serde(rename = "instance.stopped")]
    InstanceStopped,
    #[serde(rename = "instance.failed")]
    InstanceFailed,
    #[serde(rename = "instance.deleted")]
    InstanceDeleted,
    #[serde(rename = "instance.scaled")]
    InstanceScaled,
    #[serde(rename = "instance.suspended")]
    InstanceSuspended,
    #[serde(rename = "instance.unsuspended")]
    InstanceUnsuspended,

    #[serde(rename = "deploy.started")]
    DeployStarted,
    #[serde(rename = "deploy.succeeded")]
    DeploySucceeded,
    #[serde(rename = "deploy.failed")]
    DeployFailed,
    #[serde(rename = "deploy.rolled_back")]
    DeployRolledBack,

    #[serde(rename = "health.passed")]
    HealthCheckPassed,
    #[serde(rename = "health.failed")]
    HealthCheckFailed,
    #[serde(rename = "health.degraded")]
    HealthDegraded,
    #[serde(rename = "health.recovered")]
    HealthRecovered,

    #[serde(rename = "domain.added")]
    DomainAdded,
    #[serde(rename = "domain.verified")]
    DomainVerified,
    #[serde(rename = "domain.removed")]
    DomainRemoved,
    #[serde(rename = "cert.provisioned")]
    CertProvisioned,
    #[serde(rename = "cert.expiring")]
    CertExpiring,

    #[serde(rename = "tenant.created")]
    TenantCreated,
    #[serde(rename = "tenant.suspended")]
    TenantSuspended,
    #[serde(rename = "tenant.deleted")]
    TenantDeleted,
    #[serde(rename = "quota.exceeded")]
    QuotaExceeded,

    /// Any wire value this build does not know about
    #[serde(other, rename = "unknown")]
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::InstanceCreated => "instance.created",
            EventType::InstanceStarted => "instance.started",
            EventType::InstanceStopped => "instance.stopped",
            EventType::InstanceFailed => "instance.failed",
            EventType::InstanceDeleted => "instance.deleted",
            EventType::InstanceScaled => "instance.scaled",
            EventType::InstanceSuspended => "instance.suspended",
            EventType::InstanceUnsuspended => "instance.unsuspended",
            EventType::DeployStarted => "deploy.started",
            EventType::DeploySucceeded => "deploy.succeeded",
            EventType::DeployFailed => "deploy.failed",
            EventType::DeployRolledBack => "deploy.rolled_back",
            EventType::HealthCheckPassed => "health.passed",
            EventType::HealthCheckFailed => "health.failed",
            EventType::HealthDegraded => "health.degraded",
            EventType::HealthRecovered => "health.recovered",
            EventType::DomainAdded => "domain.added",
            EventType::DomainVerified => "domain.verified",
            EventType::DomainRemoved => "domain.removed",
            EventType::CertProvisioned => "cert.provisioned",
            EventType::CertExpiring => "cert.expiring",
            EventType::TenantCreated => "tenant.created",
            EventType::TenantSuspended => "tenant.suspended",
            EventType::TenantDeleted => "tenant.deleted",
            EventType::QuotaExceeded => "quota.exceeded",
            EventType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable lifecycle fact published after a committed state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: EventType,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, tenant_id: impl Into<String>) -> Self {
        Self {
            event_id: new_id(IdPrefix::Event),
            event_type,
            tenant_id: tenant_id.into(),
            instance_id: None,
            actor_id: None,
            payload: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}
