pub use ctrlplane_core::{
    Claims, Endpoint, Event, EventType, Instance, InstanceState, PortSpec, ResourceSpec,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request to create and provision a new instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    pub name: String,
    /// Provider to place the instance on; the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub region: String,
    pub image: String,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl CreateInstanceRequest {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn on_provider(mut self, provider_name: impl Into<String>) -> Self {
        self.provider_name = Some(provider_name.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Partial update of non-lifecycle fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInstanceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Resource delta; only the provided fields are merged into the current resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScaleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_millis: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
}

impl ScaleRequest {
    pub fn apply_to(&self, current: &ResourceSpec) -> ResourceSpec {
        let mut spec = current.clone();
        if let Some(cpu_millis) = self.cpu_millis {
            spec.cpu_millis = cpu_millis;
        }
        if let Some(memory_mb) = self.memory_mb {
            spec.memory_mb = memory_mb;
        }
        if let Some(replicas) = self.replicas {
            spec.replicas = replicas;
        }
        spec
    }
}

/// Filters and cursor pagination for instance listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<InstanceState>,
    /// `key` or `key=value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// ID of the last item of the previous page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    /// Page size; 0 returns every remaining item
    #[serde(default)]
    pub limit: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResult {
    pub items: Vec<Instance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Number of instances matching the filters, ignoring pagination
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_request_merges_only_provided_fields() {
        let current = ResourceSpec {
            cpu_millis: 500,
            memory_mb: 512,
            disk_mb: 1024,
            replicas: 2,
            gpu: Some("a10".to_string()),
        };
        let request = ScaleRequest {
            memory_mb: Some(2048),
            ..ScaleRequest::default()
        };

        let merged = request.apply_to(&current);
        assert_eq!(merged.cpu_millis, 500);
        assert_eq!(merged.memory_mb, 2048);
        assert_eq!(merged.replicas, 2);
        assert_eq!(merged.disk_mb, 1024);
        assert_eq!(merged.gpu.as_deref(), Some("a10"));
    }

    #[test]
    fn test_create_request_builder() {
        let request = CreateInstanceRequest::new("web", "nginx:latest")
            .on_provider("docker")
            .with_label("tier", "frontend");
        assert_eq!(request.provider_name.as_deref(), Some("docker"));
        assert_eq!(request.labels.get("tier").map(String::as_str), Some("frontend"));
        assert_eq!(request.resources, ResourceSpec::default());
    }

    #[test]
    fn test_update_request_deserializes_missing_fields_as_none() {
        let request: UpdateInstanceRequest =
            serde_json::from_str(r#"{"labels":{"env":"prod"}}"#).unwrap();
        assert!(request.name.is_none());
        assert!(request.env.is_none());
        assert_eq!(request.labels.unwrap().len(), 1);
    }
}
