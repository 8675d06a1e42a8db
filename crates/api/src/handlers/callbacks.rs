//! 节点回调接口
//!
//! 每个回调先解析出资源归属的节点，用该节点的密钥验签，然后才
//! 允许产生任何状态变更。应用尚未分配节点时不存在合法的发送方，
//! 一律按未授权拒绝。

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use platform_core::errors::{PlatformError, PlatformResult};
use platform_core::models::{domain::normalize_hostname, Application, BackupRecord, TaskStatusReport};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::authenticate_node;
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::routes::AppState;

async fn authenticate_for_application(
    state: &AppState,
    app: &Application,
    headers: &HeaderMap,
) -> PlatformResult<()> {
    let node_id = app
        .node_id
        .ok_or_else(|| PlatformError::Unauthorized("应用未分配节点，回调无合法发送方".to_string()))?;
    authenticate_node(&state.nodes, node_id, headers).await?;
    Ok(())
}

pub async fn build_status_callback(
    State(state): State<AppState>,
    Path(build_id): Path<Uuid>,
    headers: HeaderMap,
    Json(report): Json<TaskStatusReport>,
) -> Result<ApiResponse<()>, ApiError> {
    let build = state
        .builds
        .get_by_id(build_id)
        .await?
        .ok_or(PlatformError::BuildNotFound { id: build_id })?;
    let app = state
        .applications
        .get_by_id(build.application_id)
        .await?
        .ok_or(PlatformError::ApplicationNotFound {
            id: build.application_id,
        })?;
    authenticate_for_application(&state, &app, &headers).await?;

    state.callbacks.apply_task_status(build_id, &report).await?;
    Ok(ApiResponse::success_empty())
}

#[derive(Debug, Deserialize)]
pub struct LogChunk {
    pub chunk: String,
}

pub async fn build_log_callback(
    State(state): State<AppState>,
    Path(build_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<LogChunk>,
) -> Result<ApiResponse<()>, ApiError> {
    let build = state
        .builds
        .get_by_id(build_id)
        .await?
        .ok_or(PlatformError::BuildNotFound { id: build_id })?;
    let app = state
        .applications
        .get_by_id(build.application_id)
        .await?
        .ok_or(PlatformError::ApplicationNotFound {
            id: build.application_id,
        })?;
    authenticate_for_application(&state, &app, &headers).await?;

    state
        .callbacks
        .apply_build_log_chunk(build_id, &body.chunk)
        .await?;
    Ok(ApiResponse::success_empty())
}

pub async fn runtime_log_callback(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<LogChunk>,
) -> Result<ApiResponse<()>, ApiError> {
    let app = state
        .applications
        .get_by_id(application_id)
        .await?
        .ok_or(PlatformError::ApplicationNotFound { id: application_id })?;
    authenticate_for_application(&state, &app, &headers).await?;

    state
        .callbacks
        .apply_runtime_log_chunk(application_id, &body.chunk)
        .await?;
    Ok(ApiResponse::success_empty())
}

#[derive(Debug, Deserialize)]
pub struct DomainsActivation {
    pub domains: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ActivationResult {
    pub activated: u64,
}

/// 节点回报一批域名的证书已签发并挂载
///
/// 只有DNS验证已通过的域名会被置为ACTIVE，其余主机名被忽略。
pub async fn domains_activation_callback(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<DomainsActivation>,
) -> Result<ApiResponse<ActivationResult>, ApiError> {
    let app = state
        .applications
        .get_by_id(application_id)
        .await?
        .ok_or(PlatformError::ApplicationNotFound { id: application_id })?;
    authenticate_for_application(&state, &app, &headers).await?;

    let hostnames: Vec<String> = body
        .domains
        .iter()
        .map(|h| normalize_hostname(h))
        .collect();
    let activated = state
        .domains
        .mark_ssl_active_by_hostnames(app.id, &hostnames)
        .await?;

    info!("应用 {} 的 {} 个域名证书已激活", app.id, activated);
    Ok(ApiResponse::success(ActivationResult { activated }))
}

#[derive(Debug, Deserialize)]
pub struct BackupReport {
    pub path: String,
    pub size_bytes: i64,
}

pub async fn backup_callback(
    State(state): State<AppState>,
    Path(database_id): Path<Uuid>,
    headers: HeaderMap,
    Json(report): Json<BackupReport>,
) -> Result<ApiResponse<()>, ApiError> {
    let database = state
        .databases
        .get_by_id(database_id)
        .await?
        .ok_or(PlatformError::ManagedDatabaseNotFound { id: database_id })?;
    let node_id = database.node_id.ok_or_else(|| {
        PlatformError::Unauthorized("数据库实例未分配节点，回调无合法发送方".to_string())
    })?;
    authenticate_node(&state.nodes, node_id, &headers).await?;

    let record = BackupRecord {
        id: Uuid::new_v4(),
        database_id,
        path: report.path,
        size_bytes: report.size_bytes,
        created_at: Utc::now(),
    };
    state.databases.record_backup(&record).await?;

    info!("数据库实例 {} 备份已记录: {}", database_id, record.path);
    Ok(ApiResponse::success_empty())
}
