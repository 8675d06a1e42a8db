//! 节点回调处理
//!
//! 构建/应用状态的唯一写入路径：已验签的任务状态回调与日志块
//! 回调。终态不会被后到的非终态覆盖；乱序或非法的转换被拒绝
//! 并记录，不静默应用。

use std::sync::Arc;

use chrono::Utc;
use platform_core::errors::{PlatformError, PlatformResult};
use platform_core::models::{AppStatus, BuildStatus, TaskStatusReport};
use platform_core::traits::{ApplicationRepository, BuildRepository};
use platform_domain::state_machine::check_build_transition;
use platform_infrastructure::log_broker::{build_channel, runtime_channel, LogBroker};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

pub struct CallbackProcessor {
    applications: Arc<dyn ApplicationRepository>,
    builds: Arc<dyn BuildRepository>,
    broker: LogBroker,
}

impl CallbackProcessor {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        builds: Arc<dyn BuildRepository>,
        broker: LogBroker,
    ) -> Self {
        Self {
            applications,
            builds,
            broker,
        }
    }

    /// 应用一条任务状态回调
    ///
    /// `success` 使应用转入RUNNING并清除待重部署标记；`failed`
    /// 使应用转入FAILED且不动该标记；其他状态只更新构建行。
    /// 构建不存在时返回错误且不发布任何事件。
    pub async fn apply_task_status(
        &self,
        build_id: Uuid,
        report: &TaskStatusReport,
    ) -> PlatformResult<()> {
        let build = self
            .builds
            .get_by_id(build_id)
            .await?
            .ok_or(PlatformError::BuildNotFound { id: build_id })?;

        let next = match report.status.as_str() {
            "success" => BuildStatus::Success,
            "failed" => BuildStatus::Failed,
            "building" => BuildStatus::Building,
            other => {
                warn!("构建 {} 收到未知状态 {}，忽略", build_id, other);
                return Ok(());
            }
        };

        check_build_transition(build.status, next)?;

        let finished_at = next.is_terminal().then(Utc::now);
        self.builds
            .update_status(
                build_id,
                next,
                report.image_tag.as_deref(),
                report.error.as_deref(),
                finished_at,
            )
            .await?;

        match next {
            BuildStatus::Success => {
                self.applications
                    .update_status(build.application_id, AppStatus::Running)
                    .await?;
                self.applications
                    .set_needs_redeploy(build.application_id, false)
                    .await?;
                info!("构建 {} 成功，应用 {} 进入RUNNING", build_id, build.application_id);
            }
            BuildStatus::Failed => {
                self.applications
                    .update_status(build.application_id, AppStatus::Failed)
                    .await?;
                info!("构建 {} 失败，应用 {} 进入FAILED", build_id, build.application_id);
            }
            _ => {}
        }

        self.broker.publish(
            &build_channel(build_id),
            "status",
            json!({
                "status": report.status,
                "image_tag": report.image_tag,
                "error": report.error,
            }),
        );

        Ok(())
    }

    /// 追加一块构建日志并扇出给在线订阅者
    pub async fn apply_build_log_chunk(&self, build_id: Uuid, chunk: &str) -> PlatformResult<()> {
        // 先落库再扇出，持久日志是唯一可靠记录
        self.builds.append_log(build_id, chunk).await?;
        self.broker.publish(
            &build_channel(build_id),
            "chunk",
            json!({ "chunk": chunk }),
        );
        Ok(())
    }

    /// 扇出一块运行时日志，运行时日志不经控制面落库
    pub async fn apply_runtime_log_chunk(
        &self,
        application_id: Uuid,
        chunk: &str,
    ) -> PlatformResult<()> {
        let app = self
            .applications
            .get_by_id(application_id)
            .await?
            .ok_or(PlatformError::ApplicationNotFound { id: application_id })?;

        self.broker.publish(
            &runtime_channel(app.id),
            "chunk",
            json!({ "chunk": chunk }),
        );
        Ok(())
    }
}
