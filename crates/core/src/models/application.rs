use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 托管应用
///
/// `node_id` 与 `status` 只由调度器/分发器写入，用户编辑只触及
/// 名称、分支、环境变量等字段。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub region: String,
    pub node_id: Option<Uuid>,
    pub runtime_id: Uuid,
    pub plan_id: Uuid,
    pub current_build_id: Option<Uuid>,
    pub status: AppStatus,
    pub instances: i32,
    pub needs_redeploy: bool,
    pub git_url: String,
    pub git_branch: String,
    pub git_commit: Option<String>,
    pub build_command: Option<String>,
    pub start_command: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 应用状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "BUILDING")]
    Building,
    #[serde(rename = "DEPLOYING")]
    Deploying,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "STOPPED")]
    Stopped,
    #[serde(rename = "SUSPENDED")]
    Suspended,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Pending => "PENDING",
            AppStatus::Building => "BUILDING",
            AppStatus::Deploying => "DEPLOYING",
            AppStatus::Running => "RUNNING",
            AppStatus::Failed => "FAILED",
            AppStatus::Stopped => "STOPPED",
            AppStatus::Suspended => "SUSPENDED",
        }
    }
}

impl std::fmt::Display for AppStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(AppStatus::Pending),
            "BUILDING" => Ok(AppStatus::Building),
            "DEPLOYING" => Ok(AppStatus::Deploying),
            "RUNNING" => Ok(AppStatus::Running),
            "FAILED" => Ok(AppStatus::Failed),
            "STOPPED" => Ok(AppStatus::Stopped),
            "SUSPENDED" => Ok(AppStatus::Suspended),
            _ => Err(format!("Invalid application status: {s}")),
        }
    }
}

super::impl_varchar_status!(AppStatus);

/// 运行时模板，提供构建/启动命令与基础镜像的默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runtime {
    pub id: Uuid,
    pub name: String,
    pub base_image: String,
    pub default_build_command: String,
    pub default_start_command: String,
    pub port: i32,
    /// 运行时显式选择以root运行时为true，默认非root
    pub allow_root: bool,
}

/// 资源套餐，决定应用的资源上限
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub cpu_millis: i64,
    pub memory_mb: i64,
    pub disk_mb: i64,
}
