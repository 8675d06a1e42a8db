//! 节点生命周期接口
//!
//! 注册是唯一下发签名密钥的时刻，响应之后控制面不再提供取回
//! 密钥的途径。心跳、任务通道与回调都要求携带该密钥签出的令牌。

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{Duration, Utc};
use platform_core::errors::PlatformError;
use platform_core::models::{
    AppRuntimeMetric, NodeHeartbeat, NodeRegistration, NodeStatus, RegistrationToken, WorkerNode,
};
use platform_domain::node_auth::{generate_registration_token, generate_signing_secret};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::authenticate_node;
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::routes::AppState;

/// 注册成功的凭据，密钥仅在此响应中出现一次
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeCredentials {
    pub node_id: Uuid,
    pub signing_secret: String,
    pub region: String,
}

pub async fn register_node(
    State(state): State<AppState>,
    Json(request): Json<NodeRegistration>,
) -> Result<ApiResponse<NodeCredentials>, ApiError> {
    let token = state
        .registration_tokens
        .consume(&request.registration_token, Utc::now())
        .await?
        .ok_or(PlatformError::InvalidRegistrationToken)?;

    let node = WorkerNode {
        id: Uuid::new_v4(),
        region: token.region.clone(),
        host_address: request.host_address,
        signing_secret: generate_signing_secret(),
        status: NodeStatus::Pending,
        cpu_total_millis: request.cpu_total_millis.unwrap_or(0),
        memory_total_mb: request.memory_total_mb.unwrap_or(0),
        disk_total_mb: request.disk_total_mb.unwrap_or(0),
        cpu_used_millis: 0,
        memory_used_mb: 0,
        disk_used_mb: 0,
        container_count: 0,
        last_heartbeat: None,
        registered_at: Utc::now(),
    };
    let node = state.nodes.create(&node).await?;

    info!("节点 {} 注册成功, 区域 {}", node.id, node.region);
    Ok(ApiResponse::success(NodeCredentials {
        node_id: node.id,
        signing_secret: node.signing_secret,
        region: node.region,
    }))
}

/// 接收一次节点心跳
///
/// 逐应用指标中无法解析的条目被丢弃，不使整条心跳失败。
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(node_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<NodeHeartbeat>,
) -> Result<ApiResponse<()>, ApiError> {
    authenticate_node(&state.nodes, node_id, &headers).await?;

    let known = state
        .nodes
        .record_heartbeat(node_id, &payload.usage, Utc::now())
        .await?;
    if !known {
        return Err(PlatformError::NodeNotFound { id: node_id }.into());
    }

    let total = payload.applications.len();
    let metrics: Vec<AppRuntimeMetric> = payload
        .applications
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    if metrics.len() < total {
        warn!(
            "节点 {} 心跳中 {} 条应用指标无法解析，已丢弃",
            node_id,
            total - metrics.len()
        );
    }
    if !metrics.is_empty() {
        state.metrics.record_many(metrics).await?;
    }

    Ok(ApiResponse::success_empty())
}

pub async fn list_nodes(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<WorkerNode>>, ApiError> {
    Ok(ApiResponse::success(state.nodes.list_all().await?))
}

#[derive(Debug, Deserialize)]
pub struct NodeStatusRequest {
    pub status: NodeStatus,
}

pub async fn set_node_status(
    State(state): State<AppState>,
    Path(node_id): Path<Uuid>,
    Json(request): Json<NodeStatusRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    state
        .nodes
        .get_by_id(node_id)
        .await?
        .ok_or(PlatformError::NodeNotFound { id: node_id })?;
    state.nodes.update_status(node_id, request.status).await?;
    info!("节点 {} 状态设置为 {}", node_id, request.status);
    Ok(ApiResponse::success_empty())
}

/// 删除节点，仍被应用引用时拒绝
pub async fn delete_node(
    State(state): State<AppState>,
    Path(node_id): Path<Uuid>,
) -> Result<ApiResponse<()>, ApiError> {
    state
        .nodes
        .get_by_id(node_id)
        .await?
        .ok_or(PlatformError::NodeNotFound { id: node_id })?;

    let assigned = state.nodes.count_assigned_applications(node_id).await?;
    if assigned > 0 {
        return Err(ApiError::NodeInUse {
            node_id,
            applications: assigned,
        });
    }

    state.nodes.delete(node_id).await?;
    info!("节点 {} 已删除", node_id);
    Ok(ApiResponse::success_empty())
}

#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    pub region: String,
}

/// 签发一次性注册令牌
pub async fn issue_registration_token(
    State(state): State<AppState>,
    Json(request): Json<IssueTokenRequest>,
) -> Result<ApiResponse<RegistrationToken>, ApiError> {
    let now = Utc::now();
    let token = RegistrationToken {
        token: generate_registration_token(),
        region: request.region,
        created_at: now,
        expires_at: now + Duration::hours(state.registration_token_ttl_hours),
    };
    state.registration_tokens.create(&token).await?;
    Ok(ApiResponse::success(token))
}
