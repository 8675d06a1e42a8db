use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 托管数据库实例
///
/// 备份回调按 `node_id` 校验签名，与应用回调的校验方式一致。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedDatabase {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub engine: String,
    pub region: String,
    pub node_id: Option<Uuid>,
    pub status: DatabaseStatus,
    pub created_at: DateTime<Utc>,
}

/// 数据库实例状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DatabaseStatus {
    #[serde(rename = "PROVISIONING")]
    Provisioning,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "STOPPED")]
    Stopped,
    #[serde(rename = "FAILED")]
    Failed,
}

impl DatabaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseStatus::Provisioning => "PROVISIONING",
            DatabaseStatus::Running => "RUNNING",
            DatabaseStatus::Stopped => "STOPPED",
            DatabaseStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DatabaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROVISIONING" => Ok(DatabaseStatus::Provisioning),
            "RUNNING" => Ok(DatabaseStatus::Running),
            "STOPPED" => Ok(DatabaseStatus::Stopped),
            "FAILED" => Ok(DatabaseStatus::Failed),
            _ => Err(format!("Invalid database status: {s}")),
        }
    }
}

super::impl_varchar_status!(DatabaseStatus);

/// 节点上报的一次备份记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: Uuid,
    pub database_id: Uuid,
    pub path: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}
