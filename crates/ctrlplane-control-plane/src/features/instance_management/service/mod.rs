use crate::features::event_bus::EventBus;
use crate::features::instance_management::repo::InstanceRepository;
use crate::features::providers::{Provider, ProviderError, ProviderRegistry, ProvisionRequest};
use crate::shared::auth::{require_claims, RequestContext};
use crate::shared::config::ControlPlaneConfig;
use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use crate::shared::types::{
    Claims, CreateInstanceRequest, Event, EventType, Instance, InstanceState, ListOptions,
    ListResult, ScaleRequest, UpdateInstanceRequest,
};
use chrono::Utc;
use ctrlplane_core::{slugify, validate_id, validate_transition};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives instances through their lifecycle.
///
/// Every operation follows the same order: validate, persist the
/// pre-state, call the provider, persist the post-state, publish. The event
/// is published only after the final write; publish failures are logged and
/// dropped.
pub struct InstanceService {
    repo: Arc<dyn InstanceRepository>,
    providers: Arc<ProviderRegistry>,
    events: Arc<dyn EventBus>,
    config: ControlPlaneConfig,
}

impl InstanceService {
    pub fn new(
        repo: Arc<dyn InstanceRepository>,
        providers: Arc<ProviderRegistry>,
        events: Arc<dyn EventBus>,
        config: ControlPlaneConfig,
    ) -> Self {
        Self {
            repo,
            providers,
            events,
            config,
        }
    }

    /// Create an instance and provision it on the requested (or default)
    /// provider. The record is stored before the provider is called.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        request: CreateInstanceRequest,
    ) -> ControlPlaneResult<Instance> {
        let claims = require_claims(ctx)?;

        if request.name.trim().is_empty() {
            return Err(ControlPlaneError::ValidationError(
                "Instance name cannot be empty".to_string(),
            ));
        }
        if request.image.trim().is_empty() {
            return Err(ControlPlaneError::ValidationError(
                "Instance image cannot be empty".to_string(),
            ));
        }
        if slugify(&request.name).is_empty() {
            return Err(ControlPlaneError::ValidationError(
                "Instance name must contain a letter or digit".to_string(),
            ));
        }

        self.check_quota(claims).await?;

        let (provider_name, provider) = self
            .providers
            .resolve(request.provider_name.as_deref())?;

        let mut instance = Instance::new(
            claims.tenant_id.clone(),
            request.name,
            request.image,
            provider_name.clone(),
        );
        instance.region = request.region;
        instance.resources = request.resources;
        instance.env = request.env;
        instance.ports = request.ports;
        instance.labels = request.labels;

        instance.version = self.repo.insert(&instance).await?;
        debug!(
            instance_id = %instance.instance_id,
            provider = %provider_name,
            "Instance record stored"
        );

        let provision = ProvisionRequest {
            instance_id: instance.instance_id.clone(),
            tenant_id: instance.tenant_id.clone(),
            name: instance.name.clone(),
            image: instance.image.clone(),
            resources: instance.resources.clone(),
            env: instance.env.clone(),
            ports: instance.ports.clone(),
            labels: instance.labels.clone(),
        };

        let result = match provider.provision(&provision).await {
            Ok(result) => result,
            Err(e) => {
                self.compensate_failed(&mut instance, "provision", &e).await;
                return Err(ControlPlaneError::provider("provision", e));
            }
        };

        instance.provider_ref = result.provider_ref;
        instance.endpoints = result.endpoints;
        self.persist(&mut instance).await?;

        info!(
            instance_id = %instance.instance_id,
            tenant_id = %instance.tenant_id,
            provider = %provider_name,
            "Instance created successfully"
        );

        self.publish(
            Self::event(claims, EventType::InstanceCreated, &instance)
                .with_field("name", instance.name.clone())
                .with_field("slug", instance.slug.clone())
                .with_field("provider", provider_name)
                .with_field("image", instance.image.clone()),
        )
        .await;

        Ok(instance)
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> ControlPlaneResult<Instance> {
        let claims = require_claims(ctx)?;
        Self::check_id(instance_id)?;
        self.repo.get_by_id(&claims.tenant_id, instance_id).await
    }

    pub async fn get_by_slug(
        &self,
        ctx: &RequestContext,
        slug: &str,
    ) -> ControlPlaneResult<Instance> {
        let claims = require_claims(ctx)?;
        if slug.is_empty() {
            return Err(ControlPlaneError::ValidationError(
                "Slug cannot be empty".to_string(),
            ));
        }
        self.repo.get_by_slug(&claims.tenant_id, slug).await
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> ControlPlaneResult<ListResult> {
        let claims = require_claims(ctx)?;
        self.repo.list(&claims.tenant_id, &options).await
    }

    /// Apply the provided fields; lifecycle state is left alone
    pub async fn update(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        request: UpdateInstanceRequest,
    ) -> ControlPlaneResult<Instance> {
        let claims = require_claims(ctx)?;
        let mut instance = self.load(claims, instance_id).await?;

        if let Some(name) = request.name {
            let slug = slugify(&name);
            if slug.is_empty() {
                return Err(ControlPlaneError::ValidationError(
                    "Instance name must contain a letter or digit".to_string(),
                ));
            }
            instance.name = name;
            instance.slug = slug;
        }
        if let Some(env) = request.env {
            instance.env = env;
        }
        if let Some(labels) = request.labels {
            instance.labels = labels;
        }

        self.persist(&mut instance).await?;
        info!(instance_id = %instance.instance_id, "Instance updated");
        Ok(instance)
    }

    /// Deprovision and remove an instance. On provider failure the record is
    /// kept, marked failed.
    pub async fn delete(&self, ctx: &RequestContext, instance_id: &str) -> ControlPlaneResult<()> {
        let claims = require_claims(ctx)?;
        let mut instance = self.load(claims, instance_id).await?;
        validate_transition(instance.state, InstanceState::Destroying)?;
        let provider = self.providers.get(&instance.provider_name)?;

        instance.state = InstanceState::Destroying;
        self.persist(&mut instance).await?;

        if let Err(e) = provider.deprovision(&instance.instance_id).await {
            return Err(self.fail(claims, &mut instance, "deprovision", e).await);
        }

        self.repo
            .delete(&instance.tenant_id, &instance.instance_id)
            .await?;
        info!(instance_id = %instance.instance_id, "Instance deleted successfully");

        self.publish(Self::event(claims, EventType::InstanceDeleted, &instance))
            .await;
        Ok(())
    }

    pub async fn start(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> ControlPlaneResult<Instance> {
        let claims = require_claims(ctx)?;
        let mut instance = self.load(claims, instance_id).await?;
        validate_transition(instance.state, InstanceState::Starting)?;
        let provider = self.providers.get(&instance.provider_name)?;

        instance.state = InstanceState::Starting;
        self.persist(&mut instance).await?;

        if let Err(e) = provider.start(&instance.instance_id).await {
            return Err(self.fail(claims, &mut instance, "start", e).await);
        }

        instance.state = InstanceState::Running;
        self.persist(&mut instance).await?;
        info!(instance_id = %instance.instance_id, "Instance started successfully");

        self.publish(Self::event(claims, EventType::InstanceStarted, &instance))
            .await;
        Ok(instance)
    }

    pub async fn stop(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> ControlPlaneResult<Instance> {
        let claims = require_claims(ctx)?;
        let mut instance = self.load(claims, instance_id).await?;
        validate_transition(instance.state, InstanceState::Stopping)?;
        let provider = self.providers.get(&instance.provider_name)?;

        instance.state = InstanceState::Stopping;
        self.persist(&mut instance).await?;

        if let Err(e) = provider.stop(&instance.instance_id).await {
            return Err(self.fail(claims, &mut instance, "stop", e).await);
        }

        instance.state = InstanceState::Stopped;
        self.persist(&mut instance).await?;
        info!(instance_id = %instance.instance_id, "Instance stopped successfully");

        self.publish(Self::event(claims, EventType::InstanceStopped, &instance))
            .await;
        Ok(instance)
    }

    /// Restart through the provider regardless of the current state
    pub async fn restart(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> ControlPlaneResult<Instance> {
        let claims = require_claims(ctx)?;
        let mut instance = self.load(claims, instance_id).await?;
        let provider = self.providers.get(&instance.provider_name)?;

        if let Err(e) = provider.restart(&instance.instance_id).await {
            return Err(self.fail(claims, &mut instance, "restart", e).await);
        }

        instance.state = InstanceState::Running;
        self.persist(&mut instance).await?;
        info!(instance_id = %instance.instance_id, "Instance restarted successfully");

        self.publish(
            Self::event(claims, EventType::InstanceStarted, &instance).with_field("restart", true),
        )
        .await;
        Ok(instance)
    }

    /// Merge the provided resource fields and apply them through the
    /// provider. A provider failure leaves the record untouched.
    pub async fn scale(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        request: ScaleRequest,
    ) -> ControlPlaneResult<Instance> {
        let claims = require_claims(ctx)?;
        let mut instance = self.load(claims, instance_id).await?;
        let provider = self.providers.get(&instance.provider_name)?;

        let resources = request.apply_to(&instance.resources);
        provider
            .scale(&instance.instance_id, &resources)
            .await
            .map_err(|e| ControlPlaneError::provider("scale", e))?;

        instance.resources = resources;
        self.persist(&mut instance).await?;
        info!(
            instance_id = %instance.instance_id,
            cpu_millis = instance.resources.cpu_millis,
            memory_mb = instance.resources.memory_mb,
            replicas = instance.resources.replicas,
            "Instance scaled"
        );

        self.publish(
            Self::event(claims, EventType::InstanceScaled, &instance)
                .with_field("cpu_millis", instance.resources.cpu_millis)
                .with_field("memory_mb", instance.resources.memory_mb)
                .with_field("replicas", instance.resources.replicas),
        )
        .await;
        Ok(instance)
    }

    /// Stop the workload and flag the instance as suspended
    pub async fn suspend(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        reason: &str,
    ) -> ControlPlaneResult<Instance> {
        let claims = require_claims(ctx)?;
        let mut instance = self.load(claims, instance_id).await?;
        let provider = self.providers.get(&instance.provider_name)?;

        instance.suspended_at = Some(Utc::now());
        Self::drive(provider.as_ref(), "suspend", &instance.instance_id, false).await?;

        instance.state = InstanceState::Stopped;
        self.persist(&mut instance).await?;
        info!(instance_id = %instance.instance_id, %reason, "Instance suspended");

        self.publish(
            Self::event(claims, EventType::InstanceSuspended, &instance)
                .with_field("reason", reason),
        )
        .await;
        Ok(instance)
    }

    pub async fn unsuspend(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> ControlPlaneResult<Instance> {
        let claims = require_claims(ctx)?;
        let mut instance = self.load(claims, instance_id).await?;
        let provider = self.providers.get(&instance.provider_name)?;

        instance.suspended_at = None;
        Self::drive(provider.as_ref(), "unsuspend", &instance.instance_id, true).await?;

        instance.state = InstanceState::Running;
        self.persist(&mut instance).await?;
        info!(instance_id = %instance.instance_id, "Instance unsuspended");

        self.publish(Self::event(claims, EventType::InstanceUnsuspended, &instance))
            .await;
        Ok(instance)
    }

    fn check_id(instance_id: &str) -> ControlPlaneResult<()> {
        if instance_id.is_empty() {
            return Err(ControlPlaneError::ValidationError(
                "Instance ID cannot be empty".to_string(),
            ));
        }
        validate_id(instance_id)?;
        Ok(())
    }

    async fn load(&self, claims: &Claims, instance_id: &str) -> ControlPlaneResult<Instance> {
        Self::check_id(instance_id)?;
        self.repo.get_by_id(&claims.tenant_id, instance_id).await
    }

    async fn check_quota(&self, claims: &Claims) -> ControlPlaneResult<()> {
        let limit = self.config.max_instances_per_tenant;
        if limit == 0 {
            return Ok(());
        }

        let current = self.repo.count_by_tenant(&claims.tenant_id).await?;
        if current < limit {
            return Ok(());
        }

        warn!(tenant_id = %claims.tenant_id, current, limit, "Instance quota exceeded");
        let event = Event::new(EventType::QuotaExceeded, claims.tenant_id.clone())
            .with_field("resource", "instances")
            .with_field("current", current as u64)
            .with_field("limit", limit as u64);
        self.publish(Self::attribute(claims, event)).await;

        Err(ControlPlaneError::QuotaExceeded(format!(
            "tenant {} has {} of {} instances",
            claims.tenant_id, current, limit
        )))
    }

    /// Start or stop through the provider without touching the record
    async fn drive(
        provider: &dyn Provider,
        operation: &'static str,
        instance_id: &str,
        start: bool,
    ) -> ControlPlaneResult<()> {
        let result = if start {
            provider.start(instance_id).await
        } else {
            provider.stop(instance_id).await
        };
        result.map_err(|e| ControlPlaneError::provider(operation, e))
    }

    /// Stamp and write the record, keeping the local copy's version current
    async fn persist(&self, instance: &mut Instance) -> ControlPlaneResult<()> {
        instance.touch();
        instance.version = self.repo.update(instance).await?;
        Ok(())
    }

    /// Best-effort write of the failed state after a provider error. A
    /// storage error here is logged and never replaces the provider error.
    /// Returns whether the failed state was stored.
    async fn compensate_failed(
        &self,
        instance: &mut Instance,
        operation: &'static str,
        cause: &ProviderError,
    ) -> bool {
        warn!(
            instance_id = %instance.instance_id,
            operation,
            error = %cause,
            "Provider call failed, marking instance failed"
        );
        instance.state = InstanceState::Failed;
        match self.persist(instance).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    instance_id = %instance.instance_id,
                    operation,
                    error = %e,
                    "Failed to persist failed state"
                );
                false
            }
        }
    }

    /// Compensate, announce the failure once it is stored, and build the
    /// error to return
    async fn fail(
        &self,
        claims: &Claims,
        instance: &mut Instance,
        operation: &'static str,
        cause: ProviderError,
    ) -> ControlPlaneError {
        if self.compensate_failed(instance, operation, &cause).await {
            self.publish(
                Self::event(claims, EventType::InstanceFailed, instance)
                    .with_field("operation", operation)
                    .with_field("error", cause.to_string()),
            )
            .await;
        } else {
            warn!(
                instance_id = %instance.instance_id,
                operation,
                "Skipping InstanceFailed event, failed state was not stored"
            );
        }
        ControlPlaneError::provider(operation, cause)
    }

    fn event(claims: &Claims, event_type: EventType, instance: &Instance) -> Event {
        let event = Event::new(event_type, instance.tenant_id.clone())
            .with_instance(instance.instance_id.clone());
        Self::attribute(claims, event)
    }

    fn attribute(claims: &Claims, event: Event) -> Event {
        if claims.subject_id.is_empty() {
            event
        } else {
            event.with_actor(claims.subject_id.clone())
        }
    }

    async fn publish(&self, event: Event) {
        let event_type = event.event_type;
        let event_id = event.event_id.clone();
        if let Err(e) = self.events.publish(event).await {
            warn!(%event_id, %event_type, error = %e, "Failed to publish event");
        }
    }
}
