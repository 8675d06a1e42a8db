use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Worker节点信息
///
/// 签名密钥在注册时生成并仅下发一次，之后只用于校验节点回调的签名。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerNode {
    pub id: Uuid,
    pub region: String,
    pub host_address: String,
    #[serde(skip_serializing)]
    pub signing_secret: String,
    pub status: NodeStatus,
    pub cpu_total_millis: i64,
    pub memory_total_mb: i64,
    pub disk_total_mb: i64,
    pub cpu_used_millis: i64,
    pub memory_used_mb: i64,
    pub disk_used_mb: i64,
    pub container_count: i32,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

/// 节点状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ONLINE")]
    Online,
    #[serde(rename = "OFFLINE")]
    Offline,
    #[serde(rename = "DISABLED")]
    Disabled,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "PENDING",
            NodeStatus::Online => "ONLINE",
            NodeStatus::Offline => "OFFLINE",
            NodeStatus::Disabled => "DISABLED",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(NodeStatus::Pending),
            "ONLINE" => Ok(NodeStatus::Online),
            "OFFLINE" => Ok(NodeStatus::Offline),
            "DISABLED" => Ok(NodeStatus::Disabled),
            _ => Err(format!("Invalid node status: {s}")),
        }
    }
}

super::impl_varchar_status!(NodeStatus);

/// 节点资源用量快照，由心跳上报
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_used_millis: i64,
    pub memory_used_mb: i64,
    pub disk_used_mb: i64,
    pub container_count: i32,
}

/// 节点心跳载荷
///
/// `applications` 中无法解析的条目会被过滤，不影响整条心跳。
#[derive(Debug, Clone, Deserialize)]
pub struct NodeHeartbeat {
    #[serde(flatten)]
    pub usage: ResourceUsage,
    #[serde(default)]
    pub applications: Vec<serde_json::Value>,
}

/// 单个应用的运行时指标，转发给外部指标收集器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRuntimeMetric {
    pub application_id: Uuid,
    pub cpu_millis: i64,
    pub memory_mb: i64,
    pub request_rate: f64,
}

/// 节点注册请求
#[derive(Debug, Clone, Deserialize)]
pub struct NodeRegistration {
    pub registration_token: String,
    pub host_address: String,
    #[serde(default)]
    pub cpu_total_millis: Option<i64>,
    #[serde(default)]
    pub memory_total_mb: Option<i64>,
    #[serde(default)]
    pub disk_total_mb: Option<i64>,
}

/// 单次使用的节点注册令牌，由管理员离线签发
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationToken {
    pub token: String,
    pub region: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WorkerNode {
    /// 剩余容量（毫核）
    pub fn free_cpu_millis(&self) -> i64 {
        (self.cpu_total_millis - self.cpu_used_millis).max(0)
    }

    /// 剩余容量（MB内存）
    pub fn free_memory_mb(&self) -> i64 {
        (self.memory_total_mb - self.memory_used_mb).max(0)
    }

    /// 剩余容量（MB磁盘）
    pub fn free_disk_mb(&self) -> i64 {
        (self.disk_total_mb - self.disk_used_mb).max(0)
    }

    /// 检查心跳是否在存活窗口内
    pub fn heartbeat_within(&self, ttl_seconds: i64) -> bool {
        match self.last_heartbeat {
            Some(at) => (Utc::now() - at).num_seconds() <= ttl_seconds,
            None => false,
        }
    }
}
