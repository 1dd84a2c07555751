use crate::clients::ClusterClient;
use crate::cluster::read::read_back;
use crate::cluster::{modify_rules, mutation_rules, poll_available, ClusterError};
use crate::model::{ClusterPatch, DbCluster};
use async_trait::async_trait;
use reconcile_framework::{
    resolve_fault, Action, CallbackContext, ErrorRuleSet, Handler, HandlerRequest, ProgressEvent,
    ReconcilerConfig, Stabilizer, StepFlag, TagReconciler,
};
use tracing::debug;

const MODIFIED: StepFlag = StepFlag("cluster-modified");
const RETAGGED: StepFlag = StepFlag("cluster-retagged");

pub struct UpdateCluster {
    client: ClusterClient,
    stabilizer: Stabilizer,
    tags: TagReconciler,
    rules: ErrorRuleSet,
    retry_delay_seconds: u32,
}

impl UpdateCluster {
    pub fn new(client: ClusterClient, config: &ReconcilerConfig) -> Self {
        Self {
            client,
            stabilizer: Stabilizer::new("modify", config.stabilization)
                .with_rules(mutation_rules())
                .with_retry_delay(config.retry_delay_seconds),
            tags: TagReconciler::new(config.retry_delay_seconds),
            rules: modify_rules(),
            retry_delay_seconds: config.retry_delay_seconds,
        }
    }
}

#[async_trait]
impl Handler<DbCluster> for UpdateCluster {
    fn action(&self) -> Action {
        Action::Update
    }

    async fn handle(
        &self,
        request: &HandlerRequest<DbCluster>,
        context: CallbackContext,
    ) -> ProgressEvent<DbCluster> {
        let mut model = request.desired.clone();
        let previous = request.previous.clone().unwrap_or_else(|| model.clone());
        if let Err(e) = model.validate() {
            return e.into_event();
        }
        if !previous.engine.eq_ignore_ascii_case(&model.engine) {
            return ClusterError::EngineChanged {
                from: previous.engine,
                to: model.engine,
            }
            .into_event();
        }
        let Some(identifier) = model.identifier.clone().or(previous.identifier.clone()) else {
            return ClusterError::MissingIdentifier.into_event();
        };
        model.identifier = Some(identifier.clone());

        let client = &self.client;
        let id = identifier.as_str();
        let patch = ClusterPatch::between(&previous, &model);

        let progress = MODIFIED
            .exec(ProgressEvent::progress(model, context), |model, ctx| async move {
                if patch.is_empty() {
                    debug!(identifier = id, "Nothing to modify");
                    return ProgressEvent::progress(model, ctx);
                }
                match client.modify_cluster(id, patch).await {
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

        let progress = self
            .stabilizer
            .run(progress, |_| poll_available(client, id))
            .await;

        let progress = RETAGGED
            .exec(progress, |model, ctx| async move {
                let desired = model.tags.clone();
                self.tags
                    .reconcile(
                        client,
                        id,
                        &previous.tags,
                        &desired,
                        ProgressEvent::progress(model, ctx),
                    )
                    .await
            })
            .await;

        progress
            .then(|model, ctx| read_back(client, id, model, ctx, self.retry_delay_seconds))
            .await
    }
}
