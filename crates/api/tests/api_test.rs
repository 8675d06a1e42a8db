//! API层集成测试
//!
//! 全部走内存仓储与进程内任务通道，请求经tower的oneshot直接
//! 打到Router上。

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use platform_api::{create_app, AppState};
use platform_core::errors::PlatformResult;
use platform_core::models::{
    AppRuntimeMetric, AppStatus, Application, Build, NodeStatus, Plan, RegistrationToken, Runtime,
    WorkerNode,
};
use platform_core::traits::{
    ApplicationRepository as _, BuildRepository as _, EnvVarRepository as _, MetricsRecorder,
    NodeRepository as _, RegistrationTokenRepository as _,
};
use platform_dispatcher::{CallbackProcessor, CapacityScheduler, DeployDispatcher};
use platform_domain::node_auth::{generate_signing_secret, issue_node_token};
use platform_infrastructure::agent_link::AgentLinkRegistry;
use platform_infrastructure::log_broker::LogBroker;
use platform_infrastructure::memory::{
    MemoryApplicationRepository, MemoryBuildRepository, MemoryDomainRepository,
    MemoryEnvVarRepository, MemoryManagedDatabaseRepository, MemoryNodeRepository,
    MemoryTokenRepository, PlainCipher,
};
use platform_infrastructure::metrics::LoggingMetricsRecorder;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct Harness {
    app: Router,
    nodes: Arc<MemoryNodeRepository>,
    tokens: Arc<MemoryTokenRepository>,
    applications: Arc<MemoryApplicationRepository>,
    builds: Arc<MemoryBuildRepository>,
    env_vars: Arc<MemoryEnvVarRepository>,
    links: Arc<AgentLinkRegistry>,
}

fn harness() -> Harness {
    harness_with_metrics(Arc::new(LoggingMetricsRecorder::new()))
}

fn harness_with_metrics(metrics: Arc<dyn MetricsRecorder>) -> Harness {
    let nodes = Arc::new(MemoryNodeRepository::new());
    let tokens = Arc::new(MemoryTokenRepository::new());
    let applications = Arc::new(MemoryApplicationRepository::new());
    let builds = Arc::new(MemoryBuildRepository::new());
    let env_vars = Arc::new(MemoryEnvVarRepository::new());
    let domains = Arc::new(MemoryDomainRepository::new());
    let databases = Arc::new(MemoryManagedDatabaseRepository::new());
    let links = Arc::new(AgentLinkRegistry::new());
    let cipher = Arc::new(PlainCipher);
    let broker = LogBroker::new();

    let scheduler = CapacityScheduler::new(nodes.clone(), 90);
    let dispatcher = Arc::new(DeployDispatcher::new(
        applications.clone(),
        builds.clone(),
        env_vars.clone(),
        domains.clone(),
        links.clone(),
        cipher.clone(),
        scheduler,
    ));
    let callbacks = Arc::new(CallbackProcessor::new(
        applications.clone(),
        builds.clone(),
        broker.clone(),
    ));

    let state = AppState {
        nodes: nodes.clone(),
        registration_tokens: tokens.clone(),
        applications: applications.clone(),
        builds: builds.clone(),
        env_vars: env_vars.clone(),
        domains,
        databases,
        dispatcher,
        callbacks,
        broker,
        links: links.clone(),
        cipher,
        metrics,
        registration_token_ttl_hours: 24,
    };

    Harness {
        app: create_app(state),
        nodes,
        tokens,
        applications,
        builds,
        env_vars,
        links,
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_json_signed(uri: &str, body: Value, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn sample_node(region: &str) -> WorkerNode {
    WorkerNode {
        id: Uuid::new_v4(),
        region: region.to_string(),
        host_address: "10.0.0.1".to_string(),
        signing_secret: generate_signing_secret(),
        status: NodeStatus::Online,
        cpu_total_millis: 8000,
        memory_total_mb: 16384,
        disk_total_mb: 102400,
        cpu_used_millis: 0,
        memory_used_mb: 0,
        disk_used_mb: 0,
        container_count: 0,
        last_heartbeat: Some(Utc::now()),
        registered_at: Utc::now(),
    }
}

fn sample_app(org: Uuid, region: &str, runtime_id: Uuid, plan_id: Uuid) -> Application {
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
        needs_redeploy: false,
        git_url: "https://git.example.com/web.git".to_string(),
        git_branch: "main".to_string(),
        git_commit: None,
        build_command: None,
        start_command: None,
        created_at: Utc::now(),
    }
}

fn sample_runtime() -> Runtime {
    Runtime {
        id: Uuid::new_v4(),
        name: "node-20".to_string(),
        base_image: "node:20-slim".to_string(),
        default_build_command: "npm ci && npm run build".to_string(),
        default_start_command: "npm start".to_string(),
        port: 3000,
        allow_root: false,
    }
}

fn sample_plan() -> Plan {
    Plan {
        id: Uuid::new_v4(),
        name: "starter".to_string(),
        cpu_millis: 500,
        memory_mb: 512,
        disk_mb: 1024,
    }
}

async fn seed_app(h: &Harness, org: Uuid, region: &str) -> Application {
    let runtime = sample_runtime();
    let plan = sample_plan();
    let app = sample_app(org, region, runtime.id, plan.id);
    h.applications.insert_runtime(runtime).await;
    h.applications.insert_plan(plan).await;
    h.applications.insert_application(app.clone()).await;
    app
}

#[tokio::test]
async fn registration_token_is_single_use() {
    let h = harness();
    let token = RegistrationToken {
        token: "reg-token-1".to_string(),
        region: "us-east".to_string(),
        created_at: Utc::now(),
        expires_at: Utc::now() + chrono::Duration::hours(24),
    };
    h.tokens.create(&token).await.unwrap();

    let request_body = json!({
        "registration_token": "reg-token-1",
        "host_address": "10.1.2.3",
        "cpu_total_millis": 4000,
        "memory_total_mb": 8192,
        "disk_total_mb": 51200,
    });

    let response = h
        .app
        .clone()
        .oneshot(post_json("/api/v1/nodes/register", request_body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["region"], "us-east");
    assert!(!body["data"]["signing_secret"].as_str().unwrap().is_empty());

    let node_id: Uuid = body["data"]["node_id"].as_str().unwrap().parse().unwrap();
    let node = h.nodes.get_by_id(node_id).await.unwrap().unwrap();
    assert_eq!(node.status, NodeStatus::Pending);

    // 同一令牌第二次注册被拒绝
    let response = h
        .app
        .clone()
        .oneshot(post_json("/api/v1/nodes/register", request_body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_registration_token");
}

#[tokio::test]
async fn heartbeat_requires_token_signed_by_own_secret() {
    let h = harness();
    let node = sample_node("us-east");
    h.nodes.create(&node).await.unwrap();

    let payload = json!({
        "cpu_used_millis": 1200,
        "memory_used_mb": 2048,
        "disk_used_mb": 4096,
        "container_count": 3,
    });

    // 别的密钥签出的令牌被拒绝
    let forged = issue_node_token(node.id, &generate_signing_secret()).unwrap();
    let response = h
        .app
        .clone()
        .oneshot(post_json_signed(
            &format!("/api/v1/nodes/{}/heartbeat", node.id),
            payload.clone(),
            &forged,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = issue_node_token(node.id, &node.signing_secret).unwrap();
    let response = h
        .app
        .clone()
        .oneshot(post_json_signed(
            &format!("/api/v1/nodes/{}/heartbeat", node.id),
            payload,
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let updated = h.nodes.get_by_id(node.id).await.unwrap().unwrap();
    assert_eq!(updated.cpu_used_millis, 1200);
    assert_eq!(updated.container_count, 3);
    assert!(updated.last_heartbeat.is_some());
}

mockall::mock! {
    Recorder {}

    #[async_trait]
    impl MetricsRecorder for Recorder {
        async fn record_many(&self, metrics: Vec<AppRuntimeMetric>) -> PlatformResult<()>;
    }
}

#[tokio::test]
async fn heartbeat_drops_malformed_app_metrics() {
    let mut recorder = MockRecorder::new();
    recorder
        .expect_record_many()
        .withf(|metrics| metrics.len() == 1)
        .once()
        .returning(|_| Ok(()));
    let h = harness_with_metrics(Arc::new(recorder));

    let node = sample_node("us-east");
    h.nodes.create(&node).await.unwrap();
    let token = issue_node_token(node.id, &node.signing_secret).unwrap();

    let payload = json!({
        "cpu_used_millis": 100,
        "memory_used_mb": 200,
        "disk_used_mb": 300,
        "container_count": 1,
        "applications": [
            {
                "application_id": Uuid::new_v4(),
                "cpu_millis": 80,
                "memory_mb": 128,
                "request_rate": 4.2,
            },
            { "garbage": true },
        ],
    });

    let response = h
        .app
        .clone()
        .oneshot(post_json_signed(
            &format!("/api/v1/nodes/{}/heartbeat", node.id),
            payload,
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn node_deletion_blocked_while_applications_assigned() {
    let h = harness();
    let node = sample_node("us-east");
    h.nodes.create(&node).await.unwrap();
    h.nodes.set_assigned_count(node.id, 2).await;

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/nodes/{}", node.id))
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "node_in_use");

    h.nodes.set_assigned_count(node.id, 0).await;
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/nodes/{}", node.id))
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.nodes.get_by_id(node.id).await.unwrap().is_none());
}

#[tokio::test]
async fn deploy_without_capacity_returns_conflict() {
    let h = harness();
    let org = Uuid::new_v4();
    let app = seed_app(&h, org, "eu-west").await;

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/applications/{}/deploy", app.id),
            json!({ "organization_id": org }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "no_capacity");
}

#[tokio::test]
async fn deploy_returns_receipt_and_sends_task() {
    let h = harness();
    let node = sample_node("us-east");
    h.nodes.create(&node).await.unwrap();
    let mut task_rx = h.links.register(node.id).await;

    let org = Uuid::new_v4();
    let app = seed_app(&h, org, "us-east").await;

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/applications/{}/deploy", app.id),
            json!({ "organization_id": org }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body["data"]["node_id"].as_str().unwrap(),
        node.id.to_string()
    );
    let build_id: Uuid = body["data"]["build_id"].as_str().unwrap().parse().unwrap();

    let task = task_rx.recv().await.unwrap();
    assert_eq!(task.task_id, build_id.to_string());
    assert_eq!(h.builds.count().await, 1);
}

#[tokio::test]
async fn cross_tenant_deploy_resolves_to_not_found() {
    let h = harness();
    let node = sample_node("us-east");
    h.nodes.create(&node).await.unwrap();
    let _task_rx = h.links.register(node.id).await;

    let app = seed_app(&h, Uuid::new_v4(), "us-east").await;

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/applications/{}/deploy", app.id),
            json!({ "organization_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn build_status_callback_requires_signature() {
    let h = harness();
    let node = sample_node("us-east");
    h.nodes.create(&node).await.unwrap();

    let org = Uuid::new_v4();
    let app = seed_app(&h, org, "us-east").await;
    h.applications.assign_node(app.id, node.id).await.unwrap();
    h.applications
        .update_status(app.id, AppStatus::Building)
        .await
        .unwrap();

    let build = h.builds.create(&Build::new(app.id)).await.unwrap();
    let report = json!({ "status": "success", "image_tag": "registry/web:abc123" });

    // 无令牌
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/callbacks/builds/{}/status", build.id),
            report.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let untouched = h.builds.get_by_id(build.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, platform_core::models::BuildStatus::Queued);

    // 正确签名的回调落库并推进应用状态
    let token = issue_node_token(node.id, &node.signing_secret).unwrap();
    let response = h
        .app
        .clone()
        .oneshot(post_json_signed(
            &format!("/api/v1/callbacks/builds/{}/status", build.id),
            report,
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let updated = h.builds.get_by_id(build.id).await.unwrap().unwrap();
    assert_eq!(updated.status, platform_core::models::BuildStatus::Success);
    let app = h.applications.get_by_id(app.id).await.unwrap().unwrap();
    assert_eq!(app.status, AppStatus::Running);
}

#[tokio::test]
async fn env_var_key_is_validated_and_value_encrypted() {
    let h = harness();
    let org = Uuid::new_v4();
    let app = seed_app(&h, org, "us-east").await;

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/api/v1/applications/{}/env", app.id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "organization_id": org, "key": "bad-key", "value": "x" }).to_string(),
        ))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_env_key");

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/api/v1/applications/{}/env", app.id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "organization_id": org, "key": "DATABASE_URL", "value": "postgres://secret" })
                .to_string(),
        ))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let vars = h.env_vars.list_for_application(app.id).await.unwrap();
    assert_eq!(vars.len(), 1);
    assert_ne!(vars[0].encrypted_value, "postgres://secret");

    let app = h.applications.get_by_id(app.id).await.unwrap().unwrap();
    assert!(app.needs_redeploy);
}
