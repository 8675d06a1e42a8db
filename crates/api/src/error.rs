//! API错误到HTTP响应的映射
//!
//! 错误体固定为 `{success:false, error:{code,message}}`，code是
//! 稳定的机器可读标识，客户端按code分支而不是解析message。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use platform_core::errors::PlatformError;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

#[derive(Debug)]
pub enum ApiError {
    Platform(PlatformError),
    /// 节点仍被应用引用，拒绝删除
    NodeInUse { node_id: Uuid, applications: i64 },
    BadRequest(String),
}

impl From<PlatformError> for ApiError {
    fn from(err: PlatformError) -> Self {
        ApiError::Platform(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Platform(err) => match err {
                PlatformError::ApplicationNotFound { .. }
                | PlatformError::BuildNotFound { .. }
                | PlatformError::NodeNotFound { .. }
                | PlatformError::ManagedDatabaseNotFound { .. }
                | PlatformError::DomainNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "not_found")
                }
                PlatformError::NoCapacity { .. } => (StatusCode::CONFLICT, "no_capacity"),
                PlatformError::NodeOffline { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "node_offline")
                }
                PlatformError::SendFailed { .. } => (StatusCode::BAD_GATEWAY, "send_failed"),
                PlatformError::NodeUnassigned { .. } => (StatusCode::CONFLICT, "node_unassigned"),
                PlatformError::BuildInProgress { .. } => {
                    (StatusCode::CONFLICT, "build_in_progress")
                }
                PlatformError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "invalid_transition")
                }
                PlatformError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
                PlatformError::InvalidRegistrationToken => {
                    (StatusCode::BAD_REQUEST, "invalid_registration_token")
                }
                PlatformError::InvalidEnvKey { .. } => (StatusCode::BAD_REQUEST, "invalid_env_key"),
                PlatformError::Database(_)
                | PlatformError::Crypto(_)
                | PlatformError::Configuration(_)
                | PlatformError::Serialization(_)
                | PlatformError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
                }
            },
            ApiError::NodeInUse { .. } => (StatusCode::CONFLICT, "node_in_use"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Platform(err) => err.to_string(),
            ApiError::NodeInUse {
                node_id,
                applications,
            } => format!("节点 {node_id} 仍有 {applications} 个应用引用，不能删除"),
            ApiError::BadRequest(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.message();

        if status.is_server_error() {
            error!("请求处理失败: {}", message);
        }

        let body = json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
            },
            "timestamp": chrono::Utc::now(),
        });

        (status, Json(body)).into_response()
    }
}
