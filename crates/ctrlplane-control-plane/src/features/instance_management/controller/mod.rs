use crate::features::instance_management::service::InstanceService;
use crate::shared::auth::RequestContext;
use crate::shared::types::{
    CreateInstanceRequest, Instance, ListOptions, ListResult, ScaleRequest, UpdateInstanceRequest,
};
use ctrlplane_core::ErrorResponse;
use std::sync::Arc;
use tracing::info;

/// Controller for instance management API endpoints
///
/// Each handler logs the request and delegates to the service, mapping
/// failures onto the wire error shape.
pub struct InstanceController {
    service: Arc<InstanceService>,
}

impl InstanceController {
    pub fn new(service: Arc<InstanceService>) -> Self {
        Self { service }
    }

    pub async fn create_instance(
        &self,
        ctx: &RequestContext,
        request: CreateInstanceRequest,
    ) -> Result<Instance, ErrorResponse> {
        info!(name = %request.name, image = %request.image, "Received create instance request");

        self.service.create(ctx, request).await.map_err(Into::into)
    }

    pub async fn get_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<Instance, ErrorResponse> {
        info!(%instance_id, "Received get instance request");

        self.service.get(ctx, instance_id).await.map_err(Into::into)
    }

    pub async fn get_instance_by_slug(
        &self,
        ctx: &RequestContext,
        slug: &str,
    ) -> Result<Instance, ErrorResponse> {
        info!(%slug, "Received get instance by slug request");

        self.service.get_by_slug(ctx, slug).await.map_err(Into::into)
    }

    pub async fn list_instances(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> Result<ListResult, ErrorResponse> {
        info!("Received list instances request");

        self.service.list(ctx, options).await.map_err(Into::into)
    }

    pub async fn update_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        request: UpdateInstanceRequest,
    ) -> Result<Instance, ErrorResponse> {
        info!(%instance_id, "Received update instance request");

        self.service
            .update(ctx, instance_id, request)
            .await
            .map_err(Into::into)
    }

    pub async fn delete_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<(), ErrorResponse> {
        info!(%instance_id, "Received delete instance request");

        self.service.delete(ctx, instance_id).await.map_err(Into::into)
    }

    pub async fn start_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<Instance, ErrorResponse> {
        info!(%instance_id, "Received start instance request");

        self.service.start(ctx, instance_id).await.map_err(Into::into)
    }

    pub async fn stop_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<Instance, ErrorResponse> {
        info!(%instance_id, "Received stop instance request");

        self.service.stop(ctx, instance_id).await.map_err(Into::into)
    }

    pub async fn restart_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<Instance, ErrorResponse> {
        info!(%instance_id, "Received restart instance request");

        self.service.restart(ctx, instance_id).await.map_err(Into::into)
    }

    pub async fn scale_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        request: ScaleRequest,
    ) -> Result<Instance, ErrorResponse> {
        info!(%instance_id, "Received scale instance request");

        self.service
            .scale(ctx, instance_id, request)
            .await
            .map_err(Into::into)
    }

    pub async fn suspend_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        reason: &str,
    ) -> Result<Instance, ErrorResponse> {
        info!(%instance_id, %reason, "Received suspend instance request");

        self.service
            .suspend(ctx, instance_id, reason)
            .await
            .map_err(Into::into)
    }

    pub async fn unsuspend_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<Instance, ErrorResponse> {
        info!(%instance_id, "Received unsuspend instance request");

        self.service
            .unsuspend(ctx, instance_id)
            .await
            .map_err(Into::into)
    }
}
