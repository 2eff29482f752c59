//! Infrastructure providers.
//!
//! A provider is the adapter that actually creates and controls compute for
//! an instance (a container runtime, a VM pool, ...). The control plane only
//! talks to providers through the [`Provider`] trait and resolves them by
//! name through the [`ProviderRegistry`].

pub mod in_memory;
pub mod registry;

pub use in_memory::{InMemoryProvider, ProviderOperation};
pub use registry::ProviderRegistry;

use async_trait::async_trait;
use ctrlplane_core::{Endpoint, InstanceState, PortSpec, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("workload not found: {0}")]
    WorkloadNotFound(String),
    #[error("operation not supported: {0}")]
    Unsupported(String),
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub region: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderCapability {
    Provision,
    Scale,
    Volumes,
    Gpu,
    AutoScale,
    CustomDomains,
    Tls,
}

/// What to create for a new instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub instance_id: String,
    pub tenant_id: String,
    pub name: String,
    pub image: String,
    pub resources: ResourceSpec,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionResult {
    /// Provider-side handle for the workload
    pub provider_ref: String,
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Runtime status as observed by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRuntimeStatus {
    pub state: InstanceState,
    pub ready: bool,
    pub restarts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// Unified interface for infrastructure operations, keyed by instance ID
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    fn info(&self) -> ProviderInfo;

    fn capabilities(&self) -> Vec<ProviderCapability>;

    /// Create infrastructure resources for an instance
    async fn provision(&self, request: &ProvisionRequest) -> ProviderResult<ProvisionResult>;

    /// Tear down every resource held for an instance
    async fn deprovision(&self, instance_id: &str) -> ProviderResult<()>;

    async fn start(&self, instance_id: &str) -> ProviderResult<()>;

    async fn stop(&self, instance_id: &str) -> ProviderResult<()>;

    /// Stop then start, atomically from the provider's point of view
    async fn restart(&self, instance_id: &str) -> ProviderResult<()>;

    async fn scale(&self, instance_id: &str, spec: &ResourceSpec) -> ProviderResult<()>;

    async fn status(&self, instance_id: &str) -> ProviderResult<InstanceRuntimeStatus>;
}

pub fn has_capability(provider: &dyn Provider, capability: ProviderCapability) -> bool {
    provider.capabilities().contains(&capability)
}
