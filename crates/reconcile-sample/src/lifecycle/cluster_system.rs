use crate::clients::ClusterClient;
use crate::cluster::{ClusterError, ClusterHandlers};
use crate::model::RemoteCluster;
use reconcile_framework::sandbox::ControlPlane;
use reconcile_framework::ReconcilerConfig;
use tracing::{error, info};

/// Requests the control plane can queue before callers wait.
const CHANNEL_BUFFER: usize = 32;

/// A running cluster control plane plus the handlers wired to it.
///
/// # Example
///
/// ```ignore
/// let system = ClusterSystem::new(ReconcilerConfig::default(), 3)?;
/// let event = Driver::default()
///     .run(system.handlers.create(), HandlerRequest::new(cluster))
///     .await?;
/// system.shutdown().await?;
/// ```
pub struct ClusterSystem {
    /// Direct access to the control plane, bypassing the handlers.
    pub client: ClusterClient,

    pub handlers: ClusterHandlers,

    pub config: ReconcilerConfig,

    handle: tokio::task::JoinHandle<()>,
}

impl ClusterSystem {
    /// Spawns the control plane; transitions settle after `settle_ticks` describe calls.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ReconcilerConfig, settle_ticks: u32) -> Result<Self, ClusterError> {
        config.validate()?;

        let (plane, inner) = ControlPlane::<RemoteCluster>::new(CHANNEL_BUFFER, settle_ticks);
        let client = ClusterClient::new(inner);
        let handlers = ClusterHandlers::new(client.clone(), &config)?;
        let handle = tokio::spawn(plane.run());

        info!(settle_ticks, "Cluster system started");
        Ok(Self {
            client,
            handlers,
            config,
            handle,
        })
    }

    /// Drops every client (the handlers hold clones too) and waits for the control plane to stop.
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down cluster system...");
        drop(self.client);
        drop(self.handlers);

        if let Err(e) = self.handle.await {
            error!("Control plane task failed: {:?}", e);
            return Err(format!("Control plane task failed: {:?}", e));
        }

        info!("Cluster system shutdown complete.");
        Ok(())
    }
}
