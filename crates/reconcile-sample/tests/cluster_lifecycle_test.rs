use reconcile_framework::sandbox::Operation;
use reconcile_framework::{
    codes, Action, Backoff, Checkpoint, Driver, ErrorKind, Fault, HandlerRequest, Invocation,
    ProgressEvent, ReconcilerConfig, Tag, TagSet,
};
use reconcile_sample::cluster::INVALID_DB_CLUSTER_STATE;
use reconcile_sample::lifecycle::ClusterSystem;
use reconcile_sample::model::{ClusterPatch, DbCluster};

fn start(settle_ticks: u32) -> ClusterSystem {
    let config = ReconcilerConfig {
        stabilization: Backoff::constant(5, 300),
        retry_delay_seconds: 2,
        max_invocations: 100,
        ..ReconcilerConfig::default()
    };
    ClusterSystem::new(config, settle_ticks).unwrap()
}

fn cluster() -> DbCluster {
    DbCluster::new("aurora-postgresql", 2)
        .with_engine_version("15")
        .with_password("pg-password-1")
        .with_tags(
            TagSet::new()
                .with_system("orchestrator:stack-id", "s-1")
                .with_resource("team", "data"),
        )
}

async fn run(
    system: &ClusterSystem,
    action: Action,
    request: HandlerRequest<DbCluster>,
) -> ProgressEvent<DbCluster> {
    Driver::from_config(&system.config)
        .run(system.handlers.handler(action), request)
        .await
        .unwrap()
}

async fn create(system: &ClusterSystem, declared: DbCluster) -> DbCluster {
    match run(system, Action::Create, HandlerRequest::new(declared)).await {
        ProgressEvent::Success { model } => model,
        other => panic!("create did not succeed: {other:?}"),
    }
}

async fn calls(system: &ClusterSystem, operation: Operation) -> u32 {
    system
        .client
        .control_plane()
        .stats()
        .await
        .unwrap()
        .calls(operation)
}

#[tokio::test(start_paused = true)]
async fn test_full_lifecycle() {
    let system = start(2);

    let created = create(&system, cluster()).await;
    let identifier = created.identifier.clone().unwrap();
    assert!(identifier.starts_with("cluster-"));
    assert_eq!(created.engine_version.as_deref(), Some("15.4"));
    assert_eq!(created.storage_encrypted, Some(true));
    assert_eq!(created.master_user_password.as_deref(), Some("pg-password-1"));
    assert!(created.endpoint.is_some());

    let mut declared = cluster();
    declared.identifier = Some(identifier.clone());
    let read = run(&system, Action::Read, HandlerRequest::new(declared.clone())).await;
    assert_eq!(read.model(), Some(&created));

    let mut desired = declared.clone();
    desired.instance_count = 3;
    desired.tags = TagSet::new()
        .with_system("orchestrator:stack-id", "s-1")
        .with_resource("team", "platform");
    let updated = run(
        &system,
        Action::Update,
        HandlerRequest::new(desired.clone()).with_previous(declared),
    )
    .await;
    let updated = updated.model().cloned().unwrap();
    assert_eq!(updated.instance_count, 3);
    assert!(updated.tags.resource.contains(&Tag::new("team", "platform")));
    assert!(!updated.tags.resource.contains(&Tag::new("team", "data")));
    assert!(updated.tags.system.contains(&Tag::new("orchestrator:stack-id", "s-1")));

    let deleted = run(&system, Action::Delete, HandlerRequest::new(desired)).await;
    assert!(deleted.is_success());
    assert!(system.client.describe_cluster(&identifier).await.is_absent());

    assert_eq!(calls(&system, Operation::Create).await, 1);
    assert_eq!(calls(&system, Operation::Modify).await, 1);
    assert_eq!(calls(&system, Operation::Delete).await, 1);
    assert_eq!(calls(&system, Operation::AddTags).await, 2);
    assert_eq!(calls(&system, Operation::RemoveTags).await, 1);

    system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_create_adopts_cluster_from_invisible_attempt() {
    let system = start(1);
    let driver = Driver::from_config(&system.config);

    let invocation = driver
        .step(
            system.handlers.create(),
            Checkpoint::new(HandlerRequest::new(cluster())),
        )
        .await
        .unwrap();
    let Invocation::Reinvoke { checkpoint, .. } = invocation else {
        panic!("existence check must defer");
    };
    assert!(checkpoint.context.pre_existence_check_done());
    let identifier = checkpoint.request.desired.identifier.clone().unwrap();

    // A create that succeeded remotely but whose answer was lost.
    system
        .client
        .create_cluster(&checkpoint.request.desired)
        .await
        .unwrap();

    let event = driver
        .resume(system.handlers.create(), checkpoint)
        .await
        .unwrap();
    assert!(event.is_success());
    assert_eq!(
        event.model().and_then(|m| m.identifier.as_deref()),
        Some(identifier.as_str())
    );

    let stats = system.client.control_plane().stats().await.unwrap();
    assert_eq!(stats.resources, 1);
    assert_eq!(stats.calls(Operation::Create), 2);
}

#[tokio::test(start_paused = true)]
async fn test_create_refuses_existing_cluster() {
    let system = start(0);
    let existing = cluster().with_identifier("orders");
    system.client.create_cluster(&existing).await.unwrap();

    let event = run(&system, Action::Create, HandlerRequest::new(existing)).await;

    assert_eq!(event.error_kind(), Some(ErrorKind::AlreadyExists));
    assert_eq!(calls(&system, Operation::Create).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_create_retries_throttling() {
    let system = start(1);
    system
        .client
        .control_plane()
        .inject_fault(Operation::Create, Fault::new(codes::THROTTLING, "rate exceeded"))
        .await
        .unwrap();

    create(&system, cluster()).await;

    assert_eq!(calls(&system, Operation::Create).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_describe_while_waiting_does_not_fail_create() {
    let system = start(1);
    let driver = Driver::from_config(&system.config);

    let invocation = driver
        .step(
            system.handlers.create(),
            Checkpoint::new(HandlerRequest::new(cluster())),
        )
        .await
        .unwrap();
    let Invocation::Reinvoke { checkpoint, .. } = invocation else {
        panic!("existence check must defer");
    };
    system
        .client
        .control_plane()
        .inject_fault(Operation::Describe, Fault::new(codes::THROTTLING, "slow down"))
        .await
        .unwrap();

    let event = driver
        .resume(system.handlers.create(), checkpoint)
        .await
        .unwrap();

    assert!(event.is_success(), "create failed: {event:?}");
    assert_eq!(calls(&system, Operation::Create).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unclassified_fault_is_internal() {
    let system = start(0);
    system
        .client
        .control_plane()
        .inject_fault(
            Operation::Create,
            Fault::new("KMSKeyNotAccessibleFault", "key disabled"),
        )
        .await
        .unwrap();

    let event = run(&system, Action::Create, HandlerRequest::new(cluster())).await;

    assert_eq!(event.error_kind(), Some(ErrorKind::InternalFault));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_model_makes_no_remote_calls() {
    let system = start(0);

    let event = run(
        &system,
        Action::Create,
        HandlerRequest::new(DbCluster::new("oracle", 1)),
    )
    .await;

    assert_eq!(event.error_kind(), Some(ErrorKind::InvalidRequest));
    assert_eq!(calls(&system, Operation::Describe).await, 0);
    assert_eq!(calls(&system, Operation::Create).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_update_waits_out_busy_cluster() {
    let system = start(1);
    let created = create(&system, cluster()).await;
    system
        .client
        .control_plane()
        .inject_fault(
            Operation::Modify,
            Fault::new(INVALID_DB_CLUSTER_STATE, "cluster is backing up"),
        )
        .await
        .unwrap();

    let mut desired = created.clone();
    desired.instance_count = 4;
    let event = run(
        &system,
        Action::Update,
        HandlerRequest::new(desired).with_previous(created),
    )
    .await;

    assert_eq!(event.model().map(|m| m.instance_count), Some(4));
    assert_eq!(calls(&system, Operation::Modify).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_update_rejects_engine_change() {
    let system = start(0);
    let created = create(&system, cluster()).await;

    let mut desired = created.clone();
    desired.engine = "aurora-mysql".into();
    desired.engine_version = None;
    let event = run(
        &system,
        Action::Update,
        HandlerRequest::new(desired).with_previous(created),
    )
    .await;

    assert_eq!(event.error_kind(), Some(ErrorKind::InvalidRequest));
    assert_eq!(calls(&system, Operation::Modify).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_delete_of_missing_cluster_is_not_found() {
    let system = start(0);

    let event = run(
        &system,
        Action::Delete,
        HandlerRequest::new(cluster().with_identifier("ghost")),
    )
    .await;

    assert_eq!(event.error_kind(), Some(ErrorKind::NotFound));
}

#[tokio::test(start_paused = true)]
async fn test_drift_reports_out_of_band_change_only() {
    let system = start(0);
    let created = create(&system, cluster()).await;
    let identifier = created.identifier.clone().unwrap();

    system
        .client
        .modify_cluster(
            &identifier,
            ClusterPatch {
                instance_count: Some(5),
                ..ClusterPatch::default()
            },
        )
        .await
        .unwrap();

    let declared = cluster().with_identifier(identifier);
    let current = run(&system, Action::Read, HandlerRequest::new(declared.clone()))
        .await
        .model()
        .cloned()
        .unwrap();

    let report = system.handlers.detect_drift(&declared, &current);
    assert_eq!(
        report.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["/properties/InstanceCount"]
    );
    assert_eq!(report["/properties/InstanceCount"].to, serde_json::json!(5));
}

#[tokio::test(start_paused = true)]
async fn test_denied_orchestrator_tags_do_not_fail_create() {
    let system = start(0);
    system
        .client
        .control_plane()
        .inject_fault(Operation::AddTags, Fault::new(codes::ACCESS_DENIED, "no tagging"))
        .await
        .unwrap();

    let declared = DbCluster::new("aurora-mysql", 1)
        .with_tags(TagSet::new().with_system("orchestrator:stack-id", "s-1"));
    let event = run(&system, Action::Create, HandlerRequest::new(declared)).await;

    assert!(event.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_denied_resource_tags_fail_create() {
    let system = start(0);
    system
        .client
        .control_plane()
        .inject_fault(Operation::AddTags, Fault::new(codes::ACCESS_DENIED, "no tagging"))
        .await
        .unwrap();

    let event = run(&system, Action::Create, HandlerRequest::new(cluster())).await;

    assert_eq!(event.error_kind(), Some(ErrorKind::AccessDenied));
}
