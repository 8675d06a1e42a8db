//! 路由与共享状态

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use platform_core::traits::{
    ApplicationRepository, BuildRepository, DomainRepository, EnvVarRepository,
    ManagedDatabaseRepository, MetricsRecorder, NodeRepository, RegistrationTokenRepository,
    SecretCipher,
};
use platform_dispatcher::{CallbackProcessor, DeployDispatcher};
use platform_infrastructure::agent_link::AgentLinkRegistry;
use platform_infrastructure::log_broker::LogBroker;

use crate::handlers;

/// API共享状态
///
/// 仓储与分发器都以trait对象注入，测试用内存实现替换。
/// `links` 以具体类型持有：WebSocket处理器需要注册/注销连接，
/// 这超出了 `AgentChannel` 的发送接口。
#[derive(Clone)]
pub struct AppState {
    pub nodes: Arc<dyn NodeRepository>,
    pub registration_tokens: Arc<dyn RegistrationTokenRepository>,
    pub applications: Arc<dyn ApplicationRepository>,
    pub builds: Arc<dyn BuildRepository>,
    pub env_vars: Arc<dyn EnvVarRepository>,
    pub domains: Arc<dyn DomainRepository>,
    pub databases: Arc<dyn ManagedDatabaseRepository>,
    pub dispatcher: Arc<DeployDispatcher>,
    pub callbacks: Arc<CallbackProcessor>,
    pub broker: LogBroker,
    pub links: Arc<AgentLinkRegistry>,
    pub cipher: Arc<dyn SecretCipher>,
    pub metrics: Arc<dyn MetricsRecorder>,
    /// 管理员签发的注册令牌有效期
    pub registration_token_ttl_hours: i64,
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // 节点生命周期
        .route("/api/v1/nodes/register", post(handlers::register_node))
        .route("/api/v1/nodes/{id}/heartbeat", post(handlers::heartbeat))
        .route("/api/v1/nodes/{id}/channel", get(handlers::node_channel))
        .route("/api/v1/nodes", get(handlers::list_nodes))
        .route("/api/v1/nodes/{id}/status", put(handlers::set_node_status))
        .route("/api/v1/nodes/{id}", delete(handlers::delete_node))
        .route(
            "/api/v1/nodes/tokens",
            post(handlers::issue_registration_token),
        )
        // 部署与控制
        .route(
            "/api/v1/applications/{id}/deploy",
            post(handlers::deploy_application),
        )
        .route(
            "/api/v1/applications/{id}/control",
            post(handlers::control_application),
        )
        .route("/api/v1/builds/{id}", get(handlers::get_build))
        // 环境变量
        .route(
            "/api/v1/applications/{id}/env",
            put(handlers::upsert_env_var).get(handlers::list_env_keys),
        )
        .route(
            "/api/v1/applications/{id}/env/{key}",
            delete(handlers::delete_env_var),
        )
        // 自定义域名
        .route(
            "/api/v1/applications/{id}/domains",
            post(handlers::add_domain).get(handlers::list_domains),
        )
        .route(
            "/api/v1/applications/{id}/domains/{domain_id}/verify",
            post(handlers::verify_domain),
        )
        // 节点回调
        .route(
            "/api/v1/callbacks/builds/{id}/status",
            post(handlers::build_status_callback),
        )
        .route(
            "/api/v1/callbacks/builds/{id}/log",
            post(handlers::build_log_callback),
        )
        .route(
            "/api/v1/callbacks/applications/{id}/runtime-log",
            post(handlers::runtime_log_callback),
        )
        .route(
            "/api/v1/callbacks/applications/{id}/domains-activation",
            post(handlers::domains_activation_callback),
        )
        .route(
            "/api/v1/callbacks/databases/{id}/backup",
            post(handlers::backup_callback),
        )
        // 日志流
        .route(
            "/api/v1/builds/{id}/logs/stream",
            get(handlers::stream_build_logs),
        )
        .route(
            "/api/v1/applications/{id}/logs/stream",
            get(handlers::stream_runtime_logs),
        )
        .with_state(state)
}
