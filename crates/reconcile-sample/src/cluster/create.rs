use crate::clients::ClusterClient;
use crate::cluster::read::read_back;
use crate::cluster::{generate_identifier, mutation_rules, poll_available};
use crate::model::DbCluster;
use async_trait::async_trait;
use reconcile_framework::{
    resolve_fault, Action, CallbackContext, ErrorRuleSet, Handler, HandlerRequest,
    IdempotencyGuard, ProgressEvent, ReconcilerConfig, Stabilizer, StepFlag, TagReconciler,
    TagSet,
};
use tracing::info;

const CREATED: StepFlag = StepFlag("cluster-created");
const TAGGED: StepFlag = StepFlag("cluster-tagged");

pub struct CreateCluster {
    client: ClusterClient,
    guard: IdempotencyGuard,
    stabilizer: Stabilizer,
    tags: TagReconciler,
    rules: ErrorRuleSet,
    retry_delay_seconds: u32,
}

impl CreateCluster {
    pub fn new(client: ClusterClient, config: &ReconcilerConfig) -> Self {
        Self {
            client,
            guard: IdempotencyGuard::from_config(config).with_rules(mutation_rules()),
            stabilizer: Stabilizer::new("create", config.stabilization)
                .with_rules(mutation_rules())
                .with_retry_delay(config.retry_delay_seconds),
            tags: TagReconciler::new(config.retry_delay_seconds),
            rules: mutation_rules(),
            retry_delay_seconds: config.retry_delay_seconds,
        }
    }
}

#[async_trait]
impl Handler<DbCluster> for CreateCluster {
    fn action(&self) -> Action {
        Action::Create
    }

    async fn handle(
        &self,
        request: &HandlerRequest<DbCluster>,
        context: CallbackContext,
    ) -> ProgressEvent<DbCluster> {
        let mut model = request.desired.clone();
        if let Err(e) = model.validate() {
            return e.into_event();
        }
        // Returned with every continuation, so later invocations reuse it.
        let identifier = match &model.identifier {
            Some(identifier) => identifier.clone(),
            None => {
                let identifier = generate_identifier();
                info!(%identifier, "Generated cluster identifier");
                model.identifier = Some(identifier.clone());
                identifier
            }
        };

        let client = &self.client;
        let id = identifier.as_str();

        let progress = CREATED
            .exec(ProgressEvent::progress(model, context), |model, ctx| {
                self.guard.safe_create(
                    |_: DbCluster| async move { client.describe_cluster(id).await },
                    |model: DbCluster, ctx| async move {
                        match client.create_cluster(&model).await {
                            Ok(()) => ProgressEvent::progress(model, ctx),
                            Err(fault) => resolve_fault(
                                &fault,
                                &self.rules,
                                model,
                                ctx,
                                self.retry_delay_seconds,
                            ),
                        }
                    },
                    ProgressEvent::progress(model, ctx),
                )
            })
            .await;

        let progress = self
            .stabilizer
            .run(progress, |_| poll_available(client, id))
            .await;

        let progress = TAGGED
            .exec(progress, |model, ctx| async move {
                let desired = model.tags.clone();
                self.tags
                    .reconcile(
                        client,
                        id,
                        &TagSet::new(),
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
