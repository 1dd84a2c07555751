use crate::clients::ClusterClient;
use crate::cluster::{cluster_rules, ClusterError};
use crate::model::DbCluster;
use async_trait::async_trait;
use reconcile_framework::{
    resolve_fault, Action, CallbackContext, ErrorKind, FetchResult, Handler,
    HandlerRequest, ProgressEvent, ReconcilerConfig,
};
use tracing::debug;

/// Describes the cluster and turns the answer into the handler's final event.
pub(crate) async fn read_back(
    client: &ClusterClient,
    identifier: &str,
    declared: DbCluster,
    context: CallbackContext,
    retry_delay_seconds: u32,
) -> ProgressEvent<DbCluster> {
    match client.describe_cluster(identifier).await {
        FetchResult::Found(observed) => {
            debug!(identifier, phase = ?observed.phase, "Read back");
            ProgressEvent::success(DbCluster::from_observed(&observed, &declared))
        }
        FetchResult::Absent => ProgressEvent::failed(
            ErrorKind::NotFound,
            format!("DBCluster {identifier} not found"),
        ),
        FetchResult::Error(fault) => resolve_fault(
            &fault,
            &cluster_rules(),
            declared,
            context,
            retry_delay_seconds,
        ),
    }
}

pub struct ReadCluster {
    client: ClusterClient,
    retry_delay_seconds: u32,
}

impl ReadCluster {
    pub fn new(client: ClusterClient, config: &ReconcilerConfig) -> Self {
        Self {
            client,
            retry_delay_seconds: config.retry_delay_seconds,
        }
    }
}

#[async_trait]
impl Handler<DbCluster> for ReadCluster {
    fn action(&self) -> Action {
        Action::Read
    }

    async fn handle(
        &self,
        request: &HandlerRequest<DbCluster>,
        context: CallbackContext,
    ) -> ProgressEvent<DbCluster> {
        let declared = request.desired.clone();
        let Some(identifier) = declared.identifier.clone() else {
            return ClusterError::MissingIdentifier.into_event();
        };

        read_back(
            &self.client,
            &identifier,
            declared,
            context,
            self.retry_delay_seconds,
        )
        .await
    }
}
