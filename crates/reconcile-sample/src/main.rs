//! # Reconcile Demo
//!
//! Walks one `DbCluster` through its whole lifecycle against the simulated control plane,
//! re-invoking each handler with [`Driver`] the way an orchestrator would.
//!
//! 1. Create the cluster (identifier generated, tags applied).
//! 2. Read it back and check the declared model for drift.
//! 3. Scale it up and swap a tag.
//! 4. Delete it.
//!
//! Configuration comes from the TOML file named by `RECONCILER_CONFIG` when set, otherwise from
//! short demo delays; `RECONCILER_*` variables override either.

use reconcile_framework::stabilize::Backoff;
use reconcile_framework::tracing::setup_tracing;
use reconcile_framework::{Action, Driver, HandlerRequest, ProgressEvent, ReconcilerConfig, TagSet};
use reconcile_sample::lifecycle::ClusterSystem;
use reconcile_sample::model::DbCluster;
use tracing::{info, warn, Instrument};

/// Control plane transitions settle after this many describe calls.
const SETTLE_TICKS: u32 = 3;

fn load_config() -> Result<ReconcilerConfig, String> {
    let config = match std::env::var("RECONCILER_CONFIG") {
        Ok(path) => ReconcilerConfig::load(path).map_err(|e| e.to_string())?,
        Err(_) => ReconcilerConfig {
            stabilization: Backoff::constant(1, 120),
            retry_delay_seconds: 1,
            ..ReconcilerConfig::default()
        },
    };
    config.with_env_overrides().map_err(|e| e.to_string())
}

async fn drive(
    system: &ClusterSystem,
    action: Action,
    request: HandlerRequest<DbCluster>,
) -> Result<DbCluster, String> {
    let span = tracing::info_span!("operation", %action);
    let event = Driver::from_config(&system.config)
        .run(system.handlers.handler(action), request)
        .instrument(span)
        .await
        .map_err(|e| e.to_string())?;

    match event {
        ProgressEvent::Success { model } => Ok(model),
        ProgressEvent::Failed { kind, message } => Err(format!("{action} failed: {kind}: {message}")),
        ProgressEvent::InProgress { .. } => Err(format!("{action} did not finish")),
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = load_config()?;
    info!(?config, "Starting reconcile demo");
    let system = ClusterSystem::new(config, SETTLE_TICKS).map_err(|e| e.to_string())?;

    let declared = DbCluster::new("Aurora-MySQL", 2)
        .with_engine_version("8.0")
        .with_password("demo-password-1")
        .with_tags(
            TagSet::new()
                .with_stack("stack-name", "demo")
                .with_resource("team", "data")
                .with_resource("env", "staging"),
        );

    let created = drive(&system, Action::Create, HandlerRequest::new(declared.clone())).await?;
    let identifier = created.identifier.clone().unwrap_or_default();
    info!(%identifier, endpoint = ?created.endpoint, "Cluster created");

    let mut declared = declared;
    declared.identifier = Some(identifier.clone());
    let current = drive(&system, Action::Read, HandlerRequest::new(declared.clone())).await?;
    let drift = system.handlers.detect_drift(&declared, &current);
    if drift.is_empty() {
        info!(%identifier, "No drift: the remote normalization is explained by the schema");
    } else {
        for (path, mutation) in &drift {
            warn!(%path, from = %mutation.from, to = %mutation.to, "Drift detected");
        }
    }

    let mut scaled = declared.clone();
    scaled.instance_count = 4;
    scaled.tags = TagSet::new()
        .with_stack("stack-name", "demo")
        .with_resource("team", "data")
        .with_resource("env", "production");
    let updated = drive(
        &system,
        Action::Update,
        HandlerRequest::new(scaled.clone()).with_previous(declared),
    )
    .await?;
    info!(
        %identifier,
        instance_count = updated.instance_count,
        tags = updated.tags.resource.len(),
        "Cluster updated"
    );

    drive(&system, Action::Delete, HandlerRequest::new(scaled)).await?;
    info!(%identifier, "Cluster deleted");

    system.shutdown().await?;

    info!("Demo completed successfully");
    Ok(())
}
