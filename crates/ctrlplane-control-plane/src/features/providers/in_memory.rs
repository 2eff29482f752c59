use crate::features::providers::{
    InstanceRuntimeStatus, Provider, ProviderCapability, ProviderError, ProviderInfo,
    ProviderResult, ProvisionRequest, ProvisionResult,
};
use async_trait::async_trait;
use ctrlplane_core::{slugify, Endpoint, InstanceState, ResourceSpec};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOperation {
    Provision,
    Deprovision,
    Start,
    Stop,
    Restart,
    Scale,
    Status,
}

impl ProviderOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderOperation::Provision => "provision",
            ProviderOperation::Deprovision => "deprovision",
            ProviderOperation::Start => "start",
            ProviderOperation::Stop => "stop",
            ProviderOperation::Restart => "restart",
            ProviderOperation::Scale => "scale",
            ProviderOperation::Status => "status",
        }
    }
}

#[derive(Debug, Clone)]
struct Workload {
    state: InstanceState,
    spec: ResourceSpec,
    restarts: u32,
    endpoints: Vec<Endpoint>,
}

#[derive(Default)]
struct ProviderState {
    workloads: HashMap<String, Workload>,
    failing: HashSet<ProviderOperation>,
    calls: Vec<(ProviderOperation, String)>,
}

/// Process-local provider that simulates workloads in memory.
///
/// Used for development and tests; individual operations can be told to fail
/// with [`InMemoryProvider::fail_on`].
#[derive(Clone)]
pub struct InMemoryProvider {
    name: String,
    state: Arc<Mutex<ProviderState>>,
}

impl InMemoryProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    pub fn fail_on(&self, operation: ProviderOperation) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.insert(operation);
        }
    }

    pub fn recover(&self, operation: ProviderOperation) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.remove(&operation);
        }
    }

    /// Every operation received so far, in call order
    pub fn calls(&self) -> Vec<(ProviderOperation, String)> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self, operation: ProviderOperation) -> usize {
        self.calls().iter().filter(|(op, _)| *op == operation).count()
    }

    pub fn workload_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.workloads.len())
            .unwrap_or_default()
    }

    /// Record the call, then apply `action` to the workload unless the
    /// operation is set to fail.
    fn apply<T>(
        &self,
        operation: ProviderOperation,
        instance_id: &str,
        action: impl FnOnce(&mut ProviderState) -> ProviderResult<T>,
    ) -> ProviderResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ProviderError::Unavailable("provider state lock poisoned".to_string()))?;
        state.calls.push((operation, instance_id.to_string()));

        if state.failing.contains(&operation) {
            return Err(ProviderError::Unavailable(format!(
                "{} {} failed on provider {}",
                operation.as_str(),
                instance_id,
                self.name
            )));
        }

        debug!(
            provider = %self.name,
            operation = operation.as_str(),
            %instance_id,
            "Applying provider operation"
        );
        action(&mut state)
    }

    fn set_state(
        state: &mut ProviderState,
        instance_id: &str,
        next: InstanceState,
    ) -> ProviderResult<()> {
        let workload = state
            .workloads
            .get_mut(instance_id)
            .ok_or_else(|| ProviderError::WorkloadNotFound(instance_id.to_string()))?;
        workload.state = next;
        Ok(())
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            region: "local".to_string(),
        }
    }

    fn capabilities(&self) -> Vec<ProviderCapability> {
        vec![ProviderCapability::Provision, ProviderCapability::Scale]
    }

    async fn provision(&self, request: &ProvisionRequest) -> ProviderResult<ProvisionResult> {
        let provider_name = self.name.clone();
        self.apply(ProviderOperation::Provision, &request.instance_id, |state| {
            if state.workloads.contains_key(&request.instance_id) {
                return Err(ProviderError::Rejected(format!(
                    "workload {} already provisioned",
                    request.instance_id
                )));
            }

            let host = format!(
                "{}.{}.{}.internal",
                slugify(&request.name),
                request.tenant_id,
                provider_name
            );
            let endpoints: Vec<Endpoint> = request
                .ports
                .iter()
                .map(|port| {
                    let exposed = port.host.unwrap_or(port.container);
                    Endpoint {
                        url: format!("{}://{}:{}", port.protocol, host, exposed),
                        port: exposed,
                        protocol: port.protocol.clone(),
                        public: port.host.is_some(),
                    }
                })
                .collect();

            state.workloads.insert(
                request.instance_id.clone(),
                Workload {
                    state: InstanceState::Provisioning,
                    spec: request.resources.clone(),
                    restarts: 0,
                    endpoints: endpoints.clone(),
                },
            );

            Ok(ProvisionResult {
                provider_ref: format!("{}-{}", provider_name, request.instance_id),
                endpoints,
                metadata: HashMap::new(),
            })
        })
    }

    async fn deprovision(&self, instance_id: &str) -> ProviderResult<()> {
        self.apply(ProviderOperation::Deprovision, instance_id, |state| {
            state
                .workloads
                .remove(instance_id)
                .map(|_| ())
                .ok_or_else(|| ProviderError::WorkloadNotFound(instance_id.to_string()))
        })
    }

    async fn start(&self, instance_id: &str) -> ProviderResult<()> {
        self.apply(ProviderOperation::Start, instance_id, |state| {
            Self::set_state(state, instance_id, InstanceState::Running)
        })
    }

    async fn stop(&self, instance_id: &str) -> ProviderResult<()> {
        self.apply(ProviderOperation::Stop, instance_id, |state| {
            Self::set_state(state, instance_id, InstanceState::Stopped)
        })
    }

    async fn restart(&self, instance_id: &str) -> ProviderResult<()> {
        self.apply(ProviderOperation::Restart, instance_id, |state| {
            let workload = state
                .workloads
                .get_mut(instance_id)
                .ok_or_else(|| ProviderError::WorkloadNotFound(instance_id.to_string()))?;
            workload.state = InstanceState::Running;
            workload.restarts += 1;
            Ok(())
        })
    }

    async fn scale(&self, instance_id: &str, spec: &ResourceSpec) -> ProviderResult<()> {
        self.apply(ProviderOperation::Scale, instance_id, |state| {
            let workload = state
                .workloads
                .get_mut(instance_id)
                .ok_or_else(|| ProviderError::WorkloadNotFound(instance_id.to_string()))?;
            workload.spec = spec.clone();
            Ok(())
        })
    }

    async fn status(&self, instance_id: &str) -> ProviderResult<InstanceRuntimeStatus> {
        self.apply(ProviderOperation::Status, instance_id, |state| {
            let workload = state
                .workloads
                .get(instance_id)
                .ok_or_else(|| ProviderError::WorkloadNotFound(instance_id.to_string()))?;
            Ok(InstanceRuntimeStatus {
                state: workload.state,
                ready: workload.state == InstanceState::Running,
                restarts: workload.restarts,
                message: None,
                endpoints: workload.endpoints.clone(),
            })
        })
    }
}
