//! 节点回调认证
//!
//! 所有节点发起的请求都携带 `Authorization: Bearer <JWT>`，JWT用
//! 该节点注册时下发的密钥签名。校验顺序固定：先定位资源归属的
//! 节点，再用该节点的密钥验签并核对 `sub` 声明。密钥按节点隔离，
//! 跨节点的令牌即使签名有效也会被拒绝。

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use platform_core::errors::{PlatformError, PlatformResult};
use platform_core::models::WorkerNode;
use platform_core::traits::NodeRepository;
use platform_domain::node_auth::authorize_for_node;
use uuid::Uuid;

/// 提取Bearer令牌
pub fn bearer_token(headers: &HeaderMap) -> PlatformResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| PlatformError::Unauthorized("缺少Bearer令牌".to_string()))
}

/// 认证一个以节点身份发起的请求
///
/// 节点不存在时返回未授权而不是未找到，避免给未认证方探测节点
/// ID存在性的信道。
pub async fn authenticate_node(
    nodes: &Arc<dyn NodeRepository>,
    node_id: Uuid,
    headers: &HeaderMap,
) -> PlatformResult<WorkerNode> {
    let token = bearer_token(headers)?;
    let node = nodes
        .get_by_id(node_id)
        .await?
        .ok_or_else(|| PlatformError::Unauthorized("未知节点".to_string()))?;

    authorize_for_node(token, node.id, &node.signing_secret)?;
    Ok(node)
}
