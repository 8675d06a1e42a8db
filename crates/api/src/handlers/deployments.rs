//! 部署、控制与应用配置接口
//!
//! 所有按应用操作的接口都带 `organization_id`，归属校验在仓储的
//! `get_scoped` 中完成，跨租户的组合一律解析为未找到。

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use platform_core::errors::PlatformError;
use platform_core::models::{
    domain::normalize_hostname, is_valid_env_key, AppDomain, Build, ControlAction,
    DomainVerification, EnvironmentVariable, SslStatus,
};
use platform_domain::state_machine::ssl_transition_allowed;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    pub organization_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub node_id: Uuid,
    pub build_id: Uuid,
}

pub async fn deploy_application(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Json(request): Json<DeployRequest>,
) -> Result<ApiResponse<DeployResponse>, ApiError> {
    let receipt = state
        .dispatcher
        .trigger_deploy(application_id, request.organization_id)
        .await?;
    Ok(ApiResponse::success(DeployResponse {
        node_id: receipt.node_id,
        build_id: receipt.build_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub organization_id: Uuid,
    pub action: ControlAction,
    #[serde(default)]
    pub instances: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub node_id: Uuid,
    pub task_id: String,
}

pub async fn control_application(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Json(request): Json<ControlRequest>,
) -> Result<ApiResponse<ControlResponse>, ApiError> {
    let receipt = state
        .dispatcher
        .control(
            application_id,
            request.organization_id,
            request.action,
            request.instances,
        )
        .await?;
    Ok(ApiResponse::success(ControlResponse {
        node_id: receipt.node_id,
        task_id: receipt.task_id,
    }))
}

pub async fn get_build(
    State(state): State<AppState>,
    Path(build_id): Path<Uuid>,
) -> Result<ApiResponse<Build>, ApiError> {
    let build = state
        .builds
        .get_by_id(build_id)
        .await?
        .ok_or(PlatformError::BuildNotFound { id: build_id })?;
    Ok(ApiResponse::success(build))
}

#[derive(Debug, Deserialize)]
pub struct OrgQuery {
    pub organization_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct EnvVarRequest {
    pub organization_id: Uuid,
    pub key: String,
    pub value: String,
}

/// 设置环境变量，值在落库前加密
///
/// 改动只写库并置待重部署标记，下一次部署才会生效。
pub async fn upsert_env_var(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Json(request): Json<EnvVarRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    let app = state
        .applications
        .get_scoped(application_id, request.organization_id)
        .await?
        .ok_or(PlatformError::ApplicationNotFound { id: application_id })?;

    if !is_valid_env_key(&request.key) {
        return Err(PlatformError::InvalidEnvKey { key: request.key }.into());
    }

    let var = EnvironmentVariable {
        id: Uuid::new_v4(),
        application_id: app.id,
        key: request.key,
        encrypted_value: state.cipher.encrypt(&request.value)?,
    };
    state.env_vars.upsert(&var).await?;
    state.applications.set_needs_redeploy(app.id, true).await?;

    Ok(ApiResponse::success_empty())
}

/// 列出环境变量键，密文值不经此接口出站
pub async fn list_env_keys(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Query(query): Query<OrgQuery>,
) -> Result<ApiResponse<Vec<String>>, ApiError> {
    let app = state
        .applications
        .get_scoped(application_id, query.organization_id)
        .await?
        .ok_or(PlatformError::ApplicationNotFound { id: application_id })?;

    let keys = state
        .env_vars
        .list_for_application(app.id)
        .await?
        .into_iter()
        .map(|v| v.key)
        .collect();
    Ok(ApiResponse::success(keys))
}

pub async fn delete_env_var(
    State(state): State<AppState>,
    Path((application_id, key)): Path<(Uuid, String)>,
    Query(query): Query<OrgQuery>,
) -> Result<ApiResponse<()>, ApiError> {
    let app = state
        .applications
        .get_scoped(application_id, query.organization_id)
        .await?
        .ok_or(PlatformError::ApplicationNotFound { id: application_id })?;

    state.env_vars.delete(app.id, &key).await?;
    state.applications.set_needs_redeploy(app.id, true).await?;
    Ok(ApiResponse::success_empty())
}

#[derive(Debug, Deserialize)]
pub struct AddDomainRequest {
    pub organization_id: Uuid,
    pub hostname: String,
}

pub async fn add_domain(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Json(request): Json<AddDomainRequest>,
) -> Result<ApiResponse<AppDomain>, ApiError> {
    let app = state
        .applications
        .get_scoped(application_id, request.organization_id)
        .await?
        .ok_or(PlatformError::ApplicationNotFound { id: application_id })?;

    let hostname = normalize_hostname(&request.hostname);
    if hostname.is_empty() || !hostname.contains('.') {
        return Err(ApiError::BadRequest(format!(
            "无效的主机名: {}",
            request.hostname
        )));
    }

    let domain = AppDomain {
        id: Uuid::new_v4(),
        application_id: app.id,
        hostname,
        verification_token: format!("platform-verify-{}", Uuid::new_v4()),
        verification: DomainVerification::Pending,
        ssl_status: SslStatus::None,
        created_at: Utc::now(),
    };
    state.domains.create(&domain).await?;

    info!("应用 {} 添加域名 {}", app.id, domain.hostname);
    Ok(ApiResponse::success(domain))
}

pub async fn list_domains(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Query(query): Query<OrgQuery>,
) -> Result<ApiResponse<Vec<AppDomain>>, ApiError> {
    let app = state
        .applications
        .get_scoped(application_id, query.organization_id)
        .await?
        .ok_or(PlatformError::ApplicationNotFound { id: application_id })?;

    Ok(ApiResponse::success(
        state.domains.list_for_application(app.id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct VerifyDomainRequest {
    pub organization_id: Uuid,
}

/// 标记域名DNS验证通过并启动证书签发
pub async fn verify_domain(
    State(state): State<AppState>,
    Path((application_id, domain_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<VerifyDomainRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    let app = state
        .applications
        .get_scoped(application_id, request.organization_id)
        .await?
        .ok_or(PlatformError::ApplicationNotFound { id: application_id })?;

    let domain = state
        .domains
        .list_for_application(app.id)
        .await?
        .into_iter()
        .find(|d| d.id == domain_id)
        .ok_or(PlatformError::DomainNotFound { id: domain_id })?;

    state.domains.mark_verified(domain.id).await?;
    if ssl_transition_allowed(
        DomainVerification::Verified,
        domain.ssl_status,
        SslStatus::Provisioning,
    ) {
        state
            .domains
            .update_ssl_status(domain.id, SslStatus::Provisioning)
            .await?;
    }

    info!("域名 {} 验证通过", domain.hostname);
    Ok(ApiResponse::success_empty())
}
