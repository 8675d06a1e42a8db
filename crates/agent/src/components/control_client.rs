//! 控制面客户端
//!
//! 节点身份（节点ID与签名密钥）在注册时获得并持久化到身份文件，
//! 密钥只下发一次，文件丢失意味着必须用新令牌重新注册。所有
//! 回调请求都携带用该密钥签出的短期令牌。

use std::path::Path;

use platform_core::errors::{PlatformError, PlatformResult};
use platform_core::models::{AppRuntimeMetric, ResourceUsage, TaskStatusReport};
use platform_domain::node_auth::issue_node_token;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};
use uuid::Uuid;

/// 持久化的节点身份
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub node_id: Uuid,
    pub signing_secret: String,
}

impl NodeIdentity {
    /// 从身份文件加载，文件不存在返回 `None`
    pub fn load(path: &Path) -> PlatformResult<Option<NodeIdentity>> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let identity = serde_json::from_str(&content)
                    .map_err(|e| PlatformError::Serialization(format!("身份文件解析失败: {e}")))?;
                Ok(Some(identity))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PlatformError::Internal(format!("读取身份文件失败: {e}"))),
        }
    }

    pub fn save(&self, path: &Path) -> PlatformResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PlatformError::Internal(format!("创建身份目录失败: {e}")))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PlatformError::Serialization(format!("身份序列化失败: {e}")))?;
        std::fs::write(path, content)
            .map_err(|e| PlatformError::Internal(format!("写入身份文件失败: {e}")))?;
        Ok(())
    }
}

/// 注册请求的容量申报
#[derive(Debug, Clone, Default)]
pub struct CapacityReport {
    pub cpu_total_millis: Option<i64>,
    pub memory_total_mb: Option<i64>,
    pub disk_total_mb: Option<i64>,
}

pub type ChannelStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// 控制面HTTP/WebSocket客户端
pub struct ControlPlaneClient {
    base_url: String,
    identity: NodeIdentity,
    http: reqwest::Client,
}

impl ControlPlaneClient {
    pub fn new(base_url: impl Into<String>, identity: NodeIdentity) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity,
            http: reqwest::Client::new(),
        }
    }

    pub fn node_id(&self) -> Uuid {
        self.identity.node_id
    }

    /// 用一次性注册令牌注册并取得节点身份
    pub async fn register(
        base_url: &str,
        registration_token: &str,
        host_address: &str,
        capacity: &CapacityReport,
        identity_file: &Path,
    ) -> PlatformResult<NodeIdentity> {
        let url = format!("{}/api/v1/nodes/register", base_url.trim_end_matches('/'));
        let response = reqwest::Client::new()
            .post(&url)
            .json(&json!({
                "registration_token": registration_token,
                "host_address": host_address,
                "cpu_total_millis": capacity.cpu_total_millis,
                "memory_total_mb": capacity.memory_total_mb,
                "disk_total_mb": capacity.disk_total_mb,
            }))
            .send()
            .await
            .map_err(|e| PlatformError::Internal(format!("注册请求失败: {e}")))?;

        if !response.status().is_success() {
            return Err(PlatformError::Internal(format!(
                "注册被拒绝, 状态码 {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Serialization(format!("注册响应解析失败: {e}")))?;
        let identity: NodeIdentity = serde_json::from_value(body["data"].clone())
            .map_err(|e| PlatformError::Serialization(format!("注册凭据解析失败: {e}")))?;

        // 密钥只下发这一次，必须先落盘再继续
        identity.save(identity_file)?;
        info!("节点 {} 注册成功，身份已写入 {:?}", identity.node_id, identity_file);
        Ok(identity)
    }

    fn bearer(&self) -> PlatformResult<String> {
        issue_node_token(self.identity.node_id, &self.identity.signing_secret)
    }

    async fn post_signed(&self, path: &str, body: serde_json::Value) -> PlatformResult<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.bearer()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Internal(format!("请求 {url} 失败: {e}")))?;

        if !response.status().is_success() {
            warn!("控制面拒绝请求 {}: 状态码 {}", url, response.status());
            return Err(PlatformError::Internal(format!(
                "请求 {url} 被拒绝, 状态码 {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// 上报一次心跳
    pub async fn heartbeat(
        &self,
        usage: &ResourceUsage,
        applications: &[AppRuntimeMetric],
    ) -> PlatformResult<()> {
        self.post_signed(
            &format!("/api/v1/nodes/{}/heartbeat", self.identity.node_id),
            json!({
                "cpu_used_millis": usage.cpu_used_millis,
                "memory_used_mb": usage.memory_used_mb,
                "disk_used_mb": usage.disk_used_mb,
                "container_count": usage.container_count,
                "applications": applications,
            }),
        )
        .await
    }

    /// 回报构建/部署任务状态
    pub async fn report_task_status(
        &self,
        build_id: Uuid,
        report: &TaskStatusReport,
    ) -> PlatformResult<()> {
        self.post_signed(
            &format!("/api/v1/callbacks/builds/{build_id}/status"),
            serde_json::to_value(report)
                .map_err(|e| PlatformError::Serialization(e.to_string()))?,
        )
        .await
    }

    /// 推送一块构建日志
    pub async fn send_build_log(&self, build_id: Uuid, chunk: &str) -> PlatformResult<()> {
        self.post_signed(
            &format!("/api/v1/callbacks/builds/{build_id}/log"),
            json!({ "chunk": chunk }),
        )
        .await
    }

    /// 推送一块运行时日志
    pub async fn send_runtime_log(&self, application_id: Uuid, chunk: &str) -> PlatformResult<()> {
        self.post_signed(
            &format!("/api/v1/callbacks/applications/{application_id}/runtime-log"),
            json!({ "chunk": chunk }),
        )
        .await
    }

    /// 建立任务通道长连接
    pub async fn connect_channel(&self) -> PlatformResult<ChannelStream> {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        let url = format!("{}/api/v1/nodes/{}/channel", ws_base, self.identity.node_id);

        let mut request = url
            .into_client_request()
            .map_err(|e| PlatformError::Internal(format!("任务通道URL无效: {e}")))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", self.bearer()?)
                .parse()
                .map_err(|_| PlatformError::Internal("令牌无法作为请求头".to_string()))?,
        );

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| PlatformError::Internal(format!("任务通道连接失败: {e}")))?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_domain::node_auth::generate_signing_secret;

    #[test]
    fn identity_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent").join("identity.json");

        assert!(NodeIdentity::load(&path).unwrap().is_none());

        let identity = NodeIdentity {
            node_id: Uuid::new_v4(),
            signing_secret: generate_signing_secret(),
        };
        identity.save(&path).unwrap();

        let loaded = NodeIdentity::load(&path).unwrap().unwrap();
        assert_eq!(loaded.node_id, identity.node_id);
        assert_eq!(loaded.signing_secret, identity.signing_secret);
    }
}
