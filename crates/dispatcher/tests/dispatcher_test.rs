use std::sync::Arc;

use chrono::Utc;
use platform_core::models::{
    AppStatus, Application, BuildStatus, ControlAction, NodeStatus, Plan, Runtime, TaskPayload,
    TaskStatusReport, WorkerNode,
};
use platform_core::errors::PlatformError;
use platform_core::traits::{ApplicationRepository as _, BuildRepository as _, NodeRepository as _};
use platform_dispatcher::{CallbackProcessor, CapacityScheduler, DeployDispatcher};
use platform_infrastructure::log_broker::{build_channel, LogBroker};
use platform_infrastructure::memory::{
    MemoryApplicationRepository, MemoryBuildRepository, MemoryDomainRepository,
    MemoryEnvVarRepository, MemoryNodeRepository, PlainCipher, RecordingAgentChannel,
};
use uuid::Uuid;

struct Harness {
    nodes: Arc<MemoryNodeRepository>,
    applications: Arc<MemoryApplicationRepository>,
    builds: Arc<MemoryBuildRepository>,
    channel: Arc<RecordingAgentChannel>,
    broker: LogBroker,
    dispatcher: DeployDispatcher,
    processor: CallbackProcessor,
}

fn online_node(region: &str) -> WorkerNode {
    WorkerNode {
        id: Uuid::new_v4(),
        region: region.to_string(),
        host_address: "10.0.0.1".to_string(),
        signing_secret: "secret".to_string(),
        status: NodeStatus::Online,
        cpu_total_millis: 4000,
        memory_total_mb: 8192,
        disk_total_mb: 10240,
        cpu_used_millis: 0,
        memory_used_mb: 0,
        disk_used_mb: 0,
        container_count: 0,
        last_heartbeat: Some(Utc::now()),
        registered_at: Utc::now(),
    }
}

fn application(org: Uuid, region: &str, runtime_id: Uuid, plan_id: Uuid) -> Application {
    Application {
        id: Uuid::new_v4(),
        organization_id: org,
        name: "web".to_string(),
        region: region.to_string(),
        node_id: None,
        runtime_id,
        plan_id,
        current_build_id: None,
        status: AppStatus::Pending,
        instances: 1,
        needs_redeploy: true,
        git_url: "https://git.example.com/web.git".to_string(),
        git_branch: "main".to_string(),
        git_commit: None,
        build_command: None,
        start_command: Some("node server.js".to_string()),
        created_at: Utc::now(),
    }
}

async fn harness() -> (Harness, Runtime, Plan) {
    let nodes = Arc::new(MemoryNodeRepository::new());
    let applications = Arc::new(MemoryApplicationRepository::new());
    let builds = Arc::new(MemoryBuildRepository::new());
    let env_vars = Arc::new(MemoryEnvVarRepository::new());
    let domains = Arc::new(MemoryDomainRepository::new());
    let channel = Arc::new(RecordingAgentChannel::new());
    let broker = LogBroker::new();

    let runtime = Runtime {
        id: Uuid::new_v4(),
        name: "nodejs".to_string(),
        base_image: "node:20-alpine".to_string(),
        default_build_command: "npm ci".to_string(),
        default_start_command: "npm start".to_string(),
        port: 3000,
        allow_root: false,
    };
    let plan = Plan {
        id: Uuid::new_v4(),
        name: "starter".to_string(),
        cpu_millis: 500,
        memory_mb: 512,
        disk_mb: 1024,
    };
    applications.insert_runtime(runtime.clone()).await;
    applications.insert_plan(plan.clone()).await;

    let dispatcher = DeployDispatcher::new(
        applications.clone(),
        builds.clone(),
        env_vars,
        domains,
        channel.clone(),
        Arc::new(PlainCipher),
        CapacityScheduler::new(nodes.clone(), 90),
    );
    let processor = CallbackProcessor::new(applications.clone(), builds.clone(), broker.clone());

    (
        Harness {
            nodes,
            applications,
            builds,
            channel,
            broker,
            dispatcher,
            processor,
        },
        runtime,
        plan,
    )
}

#[tokio::test]
async fn deploy_schedules_assigns_and_sends() {
    let (h, _runtime, _plan) = harness().await;
    let node = online_node("us-east");
    let node_id = node.id;
    h.nodes.create(&node).await.unwrap();
    h.channel.set_online(node_id).await;

    let org = Uuid::new_v4();
    let app = application(org, "us-east", _runtime.id, _plan.id);
    let app_id = app.id;
    h.applications.insert_application(app).await;

    let receipt = h.dispatcher.trigger_deploy(app_id, org).await.unwrap();
    assert_eq!(receipt.node_id, node_id);

    // 分配已持久化
    let stored = h.applications.get_by_id(app_id).await.unwrap().unwrap();
    assert_eq!(stored.node_id, Some(node_id));
    assert_eq!(stored.status, AppStatus::Building);
    assert_eq!(stored.current_build_id, Some(receipt.build_id));

    // 任务以构建ID为任务键送到了节点
    let sent = h.channel.sent_tasks();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, node_id);
    assert_eq!(sent[0].1.task_id, receipt.build_id.to_string());
    match &sent[0].1.payload {
        TaskPayload::Deploy(deploy) => {
            assert_eq!(deploy.build_command, "npm ci");
            assert_eq!(deploy.start_command, "node server.js");
            assert!(!deploy.run_as_root);
        }
        _ => panic!("expected deploy task"),
    }
}

#[tokio::test]
async fn second_deploy_reuses_persisted_assignment() {
    let (h, runtime, plan) = harness().await;
    let node = online_node("us-east");
    let node_id = node.id;
    h.nodes.create(&node).await.unwrap();
    h.channel.set_online(node_id).await;

    let org = Uuid::new_v4();
    let app = application(org, "us-east", runtime.id, plan.id);
    let app_id = app.id;
    h.applications.insert_application(app).await;

    let first = h.dispatcher.trigger_deploy(app_id, org).await.unwrap();
    h.processor
        .apply_task_status(
            first.build_id,
            &TaskStatusReport {
                status: "failed".to_string(),
                image_tag: None,
                error: Some("build error".to_string()),
            },
        )
        .await
        .unwrap();

    // 区域里不再有其他可调度节点也无妨：第二次部署直接复用已有分配
    h.nodes.update_status(node_id, NodeStatus::Offline).await.unwrap();
    let second = h.dispatcher.trigger_deploy(app_id, org).await.unwrap();
    assert_eq!(second.node_id, node_id);
    assert_ne!(second.build_id, first.build_id);
}

#[tokio::test]
async fn no_capacity_and_not_found_are_distinct() {
    let (h, runtime, plan) = harness().await;
    let org = Uuid::new_v4();
    let app = application(org, "us-east", runtime.id, plan.id);
    let app_id = app.id;
    h.applications.insert_application(app).await;

    // 没有任何节点：no_capacity
    match h.dispatcher.trigger_deploy(app_id, org).await {
        Err(PlatformError::NoCapacity { region }) => assert_eq!(region, "us-east"),
        other => panic!("expected NoCapacity, got {other:?}"),
    }

    // 跨租户：not_found
    match h.dispatcher.trigger_deploy(app_id, Uuid::new_v4()).await {
        Err(PlatformError::ApplicationNotFound { id }) => assert_eq!(id, app_id),
        other => panic!("expected ApplicationNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn offline_node_leaves_rows_unmodified() {
    let (h, runtime, plan) = harness().await;
    let node = online_node("us-east");
    let node_id = node.id;
    h.nodes.create(&node).await.unwrap();
    // 节点有分配但没有活跃连接

    let org = Uuid::new_v4();
    let mut app = application(org, "us-east", runtime.id, plan.id);
    app.node_id = Some(node_id);
    let app_id = app.id;
    h.applications.insert_application(app).await;

    match h.dispatcher.trigger_deploy(app_id, org).await {
        Err(PlatformError::NodeOffline { node_id: reported }) => assert_eq!(reported, node_id),
        other => panic!("expected NodeOffline, got {other:?}"),
    }

    let stored = h.applications.get_by_id(app_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppStatus::Pending);
    assert_eq!(stored.current_build_id, None);
    assert_eq!(h.builds.count().await, 0);
}

#[tokio::test]
async fn send_failure_marks_build_failed() {
    let (h, runtime, plan) = harness().await;
    let node = online_node("us-east");
    let node_id = node.id;
    h.nodes.create(&node).await.unwrap();
    h.channel.set_online(node_id).await;
    h.channel.fail_next_send();

    let org = Uuid::new_v4();
    let app = application(org, "us-east", runtime.id, plan.id);
    let app_id = app.id;
    h.applications.insert_application(app).await;

    match h.dispatcher.trigger_deploy(app_id, org).await {
        Err(PlatformError::SendFailed { .. }) => {}
        other => panic!("expected SendFailed, got {other:?}"),
    }

    let stored = h.applications.get_by_id(app_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppStatus::Failed);
    let build_id = stored.current_build_id.unwrap();
    let build = h.builds.get_by_id(build_id).await.unwrap().unwrap();
    assert_eq!(build.status, BuildStatus::Failed);
}

#[tokio::test]
async fn success_callback_moves_app_to_running_and_clears_redeploy() {
    let (h, runtime, plan) = harness().await;
    let node = online_node("us-east");
    h.nodes.create(&node).await.unwrap();
    h.channel.set_online(node.id).await;

    let org = Uuid::new_v4();
    let app = application(org, "us-east", runtime.id, plan.id);
    let app_id = app.id;
    h.applications.insert_application(app).await;

    let receipt = h.dispatcher.trigger_deploy(app_id, org).await.unwrap();
    h.processor
        .apply_task_status(
            receipt.build_id,
            &TaskStatusReport {
                status: "success".to_string(),
                image_tag: Some("registry/web:abc".to_string()),
                error: None,
            },
        )
        .await
        .unwrap();

    let stored = h.applications.get_by_id(app_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppStatus::Running);
    assert!(!stored.needs_redeploy);

    let build = h.builds.get_by_id(receipt.build_id).await.unwrap().unwrap();
    assert_eq!(build.status, BuildStatus::Success);
    assert_eq!(build.image_tag.as_deref(), Some("registry/web:abc"));
    assert!(build.finished_at.is_some());
}

#[tokio::test]
async fn failed_callback_leaves_redeploy_flag_untouched() {
    let (h, runtime, plan) = harness().await;
    let node = online_node("us-east");
    h.nodes.create(&node).await.unwrap();
    h.channel.set_online(node.id).await;

    let org = Uuid::new_v4();
    let app = application(org, "us-east", runtime.id, plan.id);
    let app_id = app.id;
    h.applications.insert_application(app).await;

    let receipt = h.dispatcher.trigger_deploy(app_id, org).await.unwrap();
    h.processor
        .apply_task_status(
            receipt.build_id,
            &TaskStatusReport {
                status: "failed".to_string(),
                image_tag: None,
                error: Some("npm ci exited 1".to_string()),
            },
        )
        .await
        .unwrap();

    let stored = h.applications.get_by_id(app_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppStatus::Failed);
    assert!(stored.needs_redeploy);
}

#[tokio::test]
async fn terminal_status_not_overwritten_by_late_callback() {
    let (h, runtime, plan) = harness().await;
    let node = online_node("us-east");
    h.nodes.create(&node).await.unwrap();
    h.channel.set_online(node.id).await;

    let org = Uuid::new_v4();
    let app = application(org, "us-east", runtime.id, plan.id);
    let app_id = app.id;
    h.applications.insert_application(app).await;

    let receipt = h.dispatcher.trigger_deploy(app_id, org).await.unwrap();
    h.processor
        .apply_task_status(
            receipt.build_id,
            &TaskStatusReport {
                status: "success".to_string(),
                image_tag: None,
                error: None,
            },
        )
        .await
        .unwrap();

    // 迟到的building回调不能覆盖终态
    let result = h
        .processor
        .apply_task_status(
            receipt.build_id,
            &TaskStatusReport {
                status: "building".to_string(),
                image_tag: None,
                error: None,
            },
        )
        .await;
    assert!(matches!(result, Err(PlatformError::InvalidTransition { .. })));

    let build = h.builds.get_by_id(receipt.build_id).await.unwrap().unwrap();
    assert_eq!(build.status, BuildStatus::Success);
}

#[tokio::test]
async fn callback_for_unknown_build_publishes_nothing() {
    let (h, _runtime, _plan) = harness().await;
    let build_id = Uuid::new_v4();
    let mut sub = h.broker.subscribe(&build_channel(build_id));

    let result = h
        .processor
        .apply_task_status(
            build_id,
            &TaskStatusReport {
                status: "success".to_string(),
                image_tag: None,
                error: None,
            },
        )
        .await;
    assert!(matches!(result, Err(PlatformError::BuildNotFound { .. })));
    assert!(sub.receiver.try_recv().is_err());
}

#[tokio::test]
async fn control_requires_assignment_and_liveness() {
    let (h, runtime, plan) = harness().await;
    let org = Uuid::new_v4();
    let mut app = application(org, "us-east", runtime.id, plan.id);
    app.status = AppStatus::Running;
    let app_id = app.id;

    // 未分配节点
    h.applications.insert_application(app.clone()).await;
    assert!(matches!(
        h.dispatcher.control(app_id, org, ControlAction::Restart, None).await,
        Err(PlatformError::NodeUnassigned { .. })
    ));

    // 已分配但离线
    let node = online_node("us-east");
    let node_id = node.id;
    h.nodes.create(&node).await.unwrap();
    app.node_id = Some(node_id);
    h.applications.insert_application(app).await;
    assert!(matches!(
        h.dispatcher.control(app_id, org, ControlAction::Restart, None).await,
        Err(PlatformError::NodeOffline { .. })
    ));

    // 在线后送达，stop落为STOPPED
    h.channel.set_online(node_id).await;
    let receipt = h
        .dispatcher
        .control(app_id, org, ControlAction::Stop, None)
        .await
        .unwrap();
    assert!(receipt.task_id.starts_with(&app_id.to_string()));
    let stored = h.applications.get_by_id(app_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppStatus::Stopped);
}

#[tokio::test]
async fn active_build_blocks_second_dispatch() {
    let (h, runtime, plan) = harness().await;
    let node = online_node("us-east");
    h.nodes.create(&node).await.unwrap();
    h.channel.set_online(node.id).await;

    let org = Uuid::new_v4();
    let app = application(org, "us-east", runtime.id, plan.id);
    let app_id = app.id;
    h.applications.insert_application(app).await;

    h.dispatcher.trigger_deploy(app_id, org).await.unwrap();
    assert!(matches!(
        h.dispatcher.trigger_deploy(app_id, org).await,
        Err(PlatformError::BuildInProgress { .. })
    ));
}
