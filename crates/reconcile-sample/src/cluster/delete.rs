use crate::clients::ClusterClient;
use crate::cluster::{mutation_rules, ClusterError};
use crate::model::DbCluster;
use async_trait::async_trait;
use reconcile_framework::{
    probe, resolve_fault, Action, CallbackContext, ErrorRuleSet, Handler, HandlerRequest,
    ProgressEvent, ReconcilerConfig, Stabilizer, StepFlag,
};

const DELETE_REQUESTED: StepFlag = StepFlag("cluster-delete-requested");

pub struct DeleteCluster {
    client: ClusterClient,
    stabilizer: Stabilizer,
    rules: ErrorRuleSet,
    retry_delay_seconds: u32,
}

impl DeleteCluster {
    pub fn new(client: ClusterClient, config: &ReconcilerConfig) -> Self {
        Self {
            client,
            stabilizer: Stabilizer::new("delete", config.stabilization)
                .with_rules(mutation_rules())
                .with_retry_delay(config.retry_delay_seconds),
            rules: mutation_rules(),
            retry_delay_seconds: config.retry_delay_seconds,
        }
    }
}

#[async_trait]
impl Handler<DbCluster> for DeleteCluster {
    fn action(&self) -> Action {
        Action::Delete
    }

    async fn handle(
        &self,
        request: &HandlerRequest<DbCluster>,
        context: CallbackContext,
    ) -> ProgressEvent<DbCluster> {
        let model = request.desired.clone();
        let Some(identifier) = model.identifier.clone() else {
            return ClusterError::MissingIdentifier.into_event();
        };
        let client = &self.client;
        let id = identifier.as_str();

        // A cluster that is already gone on the first call is reported as NotFound.
        let progress = DELETE_REQUESTED
            .exec(ProgressEvent::progress(model, context), |model, ctx| async move {
                match client.delete_cluster(id).await {
                    Ok(()) => ProgressEvent::progress(model, ctx),
                    Err(fault) => resolve_fault(
                        &fault,
                        &self.rules,
                        model,
                        ctx,
                        self.retry_delay_seconds,
                    ),
                }
            })
            .await;

        self.stabilizer
            .run(progress, |_| async move {
                probe(
                    client.describe_cluster(id).await,
                    |observed| observed.phase.status(),
                    |observed| observed.is_none(),
                )
            })
            .await
            .done()
    }
}
