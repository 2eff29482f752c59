use ctrlplane_control_plane::features::providers::InMemoryProvider;
use ctrlplane_control_plane::shared::config::ControlPlaneConfig;
use ctrlplane_control_plane::ControlPlane;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ControlPlaneConfig::from_env()?;

    info!(node_id = %config.node_id, "Starting CtrlPlane control plane");

    let default_provider = config.default_provider.clone();
    let control_plane = ControlPlane::builder(config)
        .with_provider(
            default_provider.clone(),
            Arc::new(InMemoryProvider::new(default_provider.clone())),
        )
        .build()
        .await?;

    info!(
        provider = %default_provider,
        plugins = control_plane.plugins().extensions().len(),
        "Control plane initialized successfully"
    );

    tokio::signal::ctrl_c().await?;

    control_plane.shutdown().await;
    info!("Control plane stopped");

    Ok(())
}
