//! # Cluster Client
//!
//! Domain API over a `ControlPlaneClient<RemoteCluster>`. Handlers only talk to the remote
//! side through this type.

use crate::model::{ClusterPatch, DbCluster, RemoteCluster};
use async_trait::async_trait;
use reconcile_framework::sandbox::{ControlPlaneClient, Observed};
use reconcile_framework::{Fault, FetchResult, Tag, TaggingApi};
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct ClusterClient {
    inner: ControlPlaneClient<RemoteCluster>,
}

impl ClusterClient {
    pub fn new(inner: ControlPlaneClient<RemoteCluster>) -> Self {
        Self { inner }
    }

    /// The raw control plane handle, for fault injection and call statistics.
    pub fn control_plane(&self) -> &ControlPlaneClient<RemoteCluster> {
        &self.inner
    }

    #[instrument(skip(self, cluster), fields(identifier = cluster.identifier.as_deref()))]
    pub async fn create_cluster(&self, cluster: &DbCluster) -> Result<(), Fault> {
        debug!("Sending create");
        self.inner.create(cluster.clone()).await
    }

    #[instrument(skip(self))]
    pub async fn describe_cluster(&self, identifier: &str) -> FetchResult<Observed<RemoteCluster>> {
        self.inner.describe(identifier).await
    }

    #[instrument(skip(self))]
    pub async fn modify_cluster(&self, identifier: &str, patch: ClusterPatch) -> Result<(), Fault> {
        self.inner.modify(identifier, patch).await
    }

    #[instrument(skip(self))]
    pub async fn delete_cluster(&self, identifier: &str) -> Result<(), Fault> {
        self.inner.delete(identifier).await
    }
}

#[async_trait]
impl TaggingApi for ClusterClient {
    #[instrument(skip(self, tags), fields(count = tags.len()))]
    async fn add_tags(&self, identifier: &str, tags: &[Tag]) -> Result<(), Fault> {
        self.inner.add_tags(identifier, tags).await
    }

    #[instrument(skip(self, tags), fields(count = tags.len()))]
    async fn remove_tags(&self, identifier: &str, tags: &[Tag]) -> Result<(), Fault> {
        self.inner.remove_tags(identifier, tags).await
    }
}
