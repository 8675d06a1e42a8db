//! 控制面HTTP/WebSocket接口层
//!
//! 管理面接口、节点注册/心跳/任务通道、节点回调与日志流。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use routes::AppState;

/// 组装完整的API应用，含日志与CORS中间件
pub fn create_app(state: AppState) -> Router {
    routes::create_routes(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}
