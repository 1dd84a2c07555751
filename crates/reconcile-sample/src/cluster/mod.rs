//! # DbCluster Handlers
//!
//! The four lifecycle handlers of the `DbCluster` resource type, each a composition of the
//! framework's guards:
//!
//! | Handler | Steps |
//! |---------|-------|
//! | [`CreateCluster`] | validate, generate identifier, guarded create, stabilize, tag, read back |
//! | [`ReadCluster`] | describe |
//! | [`UpdateCluster`] | validate, modify once, stabilize, retag once, read back |
//! | [`DeleteCluster`] | delete once, stabilize until absent |
//!
//! [`ClusterHandlers`] bundles them with the drift schema.
//!
//! ## Usage
//!
//! ```rust
//! use reconcile_framework::{Driver, HandlerRequest, ReconcilerConfig};
//! use reconcile_sample::lifecycle::ClusterSystem;
//! use reconcile_sample::model::DbCluster;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let system = ClusterSystem::new(ReconcilerConfig::default(), 1).unwrap();
//! let event = Driver::default()
//!     .run(system.handlers.create(), HandlerRequest::new(DbCluster::new("aurora-mysql", 2)))
//!     .await
//!     .unwrap();
//! assert!(event.is_success());
//! system.shutdown().await.unwrap();
//! # }
//! ```

pub mod create;
pub mod delete;
pub mod error;
pub mod read;
pub mod rules;
pub mod schema;
pub mod update;

pub use create::CreateCluster;
pub use delete::DeleteCluster;
pub use error::*;
pub use read::ReadCluster;
pub use rules::*;
pub use schema::*;
pub use update::UpdateCluster;

use crate::clients::ClusterClient;
use crate::model::DbCluster;
use reconcile_framework::sandbox::Phase;
use reconcile_framework::{
    probe, Action, DriftReport, Fault, FetchResult, Handler, Probe, ReconcilerConfig, Schema,
};
use uuid::Uuid;

/// `cluster-` followed by twelve lowercase hex digits.
pub fn generate_identifier() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("cluster-{}", &uuid[..12])
}

/// One poll for "the cluster is available". A vanished cluster is a fault, not a wait.
pub(crate) async fn poll_available(client: &ClusterClient, identifier: &str) -> Result<Probe, Fault> {
    match client.describe_cluster(identifier).await {
        FetchResult::Absent => Err(Fault::new(
            DB_CLUSTER_NOT_FOUND,
            format!("DBCluster {identifier} not found"),
        )),
        fetched => probe(
            fetched,
            |observed| observed.phase.status(),
            |observed| observed.is_some_and(|o| o.phase == Phase::Available),
        ),
    }
}

pub struct ClusterHandlers {
    create: CreateCluster,
    read: ReadCluster,
    update: UpdateCluster,
    delete: DeleteCluster,
    schema: Schema,
}

impl ClusterHandlers {
    pub fn new(client: ClusterClient, config: &ReconcilerConfig) -> Result<Self, ClusterError> {
        Ok(Self {
            create: CreateCluster::new(client.clone(), config),
            read: ReadCluster::new(client.clone(), config),
            update: UpdateCluster::new(client.clone(), config),
            delete: DeleteCluster::new(client, config),
            schema: drift_schema()?,
        })
    }

    pub fn create(&self) -> &CreateCluster {
        &self.create
    }

    pub fn read(&self) -> &ReadCluster {
        &self.read
    }

    pub fn update(&self) -> &UpdateCluster {
        &self.update
    }

    pub fn delete(&self) -> &DeleteCluster {
        &self.delete
    }

    pub fn handler(&self, action: Action) -> &dyn Handler<DbCluster> {
        match action {
            Action::Create => &self.create,
            Action::Read => &self.read,
            Action::Update => &self.update,
            Action::Delete => &self.delete,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Compares a declared model with one read back from the control plane.
    pub fn detect_drift(&self, declared: &DbCluster, current: &DbCluster) -> DriftReport {
        cluster_drift(&self.schema, declared, current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_identifiers_are_valid_and_distinct() {
        let first = generate_identifier();
        let second = generate_identifier();
        assert_ne!(first, second);
        assert_eq!(first.len(), "cluster-".len() + 12);
        assert!(DbCluster::new("aurora-mysql", 1)
            .with_identifier(first)
            .validate()
            .is_ok());
    }
}
