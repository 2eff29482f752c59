pub mod event;
pub mod lifecycle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub use event::{Event, EventType};
pub use lifecycle::{allowed_transitions, can_transition, is_terminal, validate_transition};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidState {
        from: InstanceState,
        to: InstanceState,
    },
    #[error("Invalid identifier: {0:?}")]
    InvalidId(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Entity kind encoded in front of every generated identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    Instance,
    Event,
}

impl IdPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Instance => "inst",
            IdPrefix::Event => "evt",
        }
    }
}

/// Generate a globally unique identifier of the form `prefix_<32 hex chars>`
pub fn new_id(prefix: IdPrefix) -> String {
    format!("{}_{}", prefix.as_str(), Uuid::new_v4().simple())
}

/// Reject identifiers that are empty or contain characters outside
/// `[A-Za-z0-9_-]`
pub fn validate_id(id: &str) -> Result<()> {
    let well_formed = !id.is_empty()
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if well_formed {
        Ok(())
    } else {
        Err(CoreError::InvalidId(id.to_string()))
    }
}

/// Convert a human name into a URL-safe slug.
///
/// ASCII letters and digits are lowercased and kept. Every run of other
/// characters (including `-` and `_`) becomes a single `-` between them, so
/// the result never starts or ends with `-`. A name without letters or
/// digits yields an empty slug.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Provisioning,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
    Destroying,
    Destroyed,
}

impl InstanceState {
    pub const ALL: [InstanceState; 8] = [
        InstanceState::Provisioning,
        InstanceState::Starting,
        InstanceState::Running,
        InstanceState::Stopping,
        InstanceState::Stopped,
        InstanceState::Failed,
        InstanceState::Destroying,
        InstanceState::Destroyed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Provisioning => "provisioning",
            InstanceState::Starting => "starting",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Failed => "failed",
            InstanceState::Destroying => "destroying",
            InstanceState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired resources for an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpu_millis: u32,
    pub memory_mb: u32,
    #[serde(default)]
    pub disk_mb: u32,
    pub replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cpu_millis: 250,
            memory_mb: 256,
            disk_mb: 0,
            replicas: 1,
            gpu: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub container: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<u16>,
    pub protocol: String,
}

impl PortSpec {
    pub fn tcp(container: u16) -> Self {
        Self {
            container,
            host: None,
            protocol: "tcp".to_string(),
        }
    }
}

/// Network endpoint resolved by a provider after provisioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub port: u16,
    pub protocol: String,
    pub public: bool,
}

/// A managed application instance belonging to a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub tenant_id: String,
    pub name: String,
    pub slug: String,
    pub provider_name: String,
    #[serde(default)]
    pub provider_ref: String,
    #[serde(default)]
    pub region: String,
    pub state: InstanceState,
    pub image: String,
    pub resources: ResourceSpec,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency stamp, bumped by the store on every write
    pub version: u64,
}

impl Instance {
    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        image: impl Into<String>,
        provider_name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            instance_id: new_id(IdPrefix::Instance),
            tenant_id: tenant_id.into(),
            slug: slugify(&name),
            name,
            provider_name: provider_name.into(),
            provider_ref: String::new(),
            region: String::new(),
            state: InstanceState::Provisioning,
            image: image.into(),
            resources: ResourceSpec::default(),
            env: HashMap::new(),
            ports: Vec::new(),
            endpoints: Vec::new(),
            labels: HashMap::new(),
            current_release: None,
            suspended_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended_at.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Match a `key` (presence) or `key=value` (exact) label filter
    pub fn matches_label(&self, filter: &str) -> bool {
        match filter.split_once('=') {
            Some((key, value)) => self.labels.get(key).map(String::as_str) == Some(value),
            None => self.labels.contains_key(filter),
        }
    }
}

/// Authenticated identity attached to a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub subject_id: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Claims {
    pub const SYSTEM_ADMIN_ROLE: &'static str = "system:admin";

    pub fn new(tenant_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            tenant_id: tenant_id.into(),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_system_admin(&self) -> bool {
        self.has_role(Self::SYSTEM_ADMIN_ROLE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    pub details: Option<HashMap<String, String>>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }
}
