use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 一次构建尝试
///
/// 构建ID同时是部署任务的任务ID，节点侧以此去重。
/// `current_build_id` 指向最近一次尝试的构建，不保证成功。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: Uuid,
    pub application_id: Uuid,
    pub status: BuildStatus,
    pub image_tag: Option<String>,
    pub build_log: String,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Build {
    pub fn new(application_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id,
            status: BuildStatus::Queued,
            image_tag: None,
            build_log: String::new(),
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// 构建状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BuildStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "BUILDING")]
    Building,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Queued => "QUEUED",
            BuildStatus::Building => "BUILDING",
            BuildStatus::Success => "SUCCESS",
            BuildStatus::Failed => "FAILED",
        }
    }

    /// 终态不允许被后到的非终态覆盖
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Failed)
    }

    /// 活跃构建：一个应用同时最多有一个
    pub fn is_active(&self) -> bool {
        matches!(self, BuildStatus::Queued | BuildStatus::Building)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(BuildStatus::Queued),
            "BUILDING" => Ok(BuildStatus::Building),
            "SUCCESS" => Ok(BuildStatus::Success),
            "FAILED" => Ok(BuildStatus::Failed),
            _ => Err(format!("Invalid build status: {s}")),
        }
    }
}

super::impl_varchar_status!(BuildStatus);
