//! 部署分发器
//!
//! 把一次部署/控制请求变成发给节点代理的任务。发送成功与构建
//! 成功是两回事：这里只保证任务帧被代理收到，构建结果经签名
//! 回调由 `CallbackProcessor` 落库。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use platform_core::errors::{PlatformError, PlatformResult};
use platform_core::models::{
    AppStatus, Application, Build, ControlAction, ControlTask, DeployTask, Runtime, TaskDescriptor,
    TaskPayload,
};
use platform_core::traits::{
    AgentChannel, ApplicationRepository, BuildRepository, DomainRepository, EnvVarRepository,
    SecretCipher,
};
use platform_domain::state_machine::check_app_transition;
use platform_domain::ResourceRequirements;
use tracing::{info, warn};
use uuid::Uuid;

use crate::scheduler::CapacityScheduler;

/// 部署受理结果：任务已送达代理，构建结果后续经回调到达
#[derive(Debug, Clone)]
pub struct DeployReceipt {
    pub node_id: Uuid,
    pub build_id: Uuid,
}

/// 控制任务受理结果
#[derive(Debug, Clone)]
pub struct ControlReceipt {
    pub node_id: Uuid,
    pub task_id: String,
}

pub struct DeployDispatcher {
    applications: Arc<dyn ApplicationRepository>,
    builds: Arc<dyn BuildRepository>,
    env_vars: Arc<dyn EnvVarRepository>,
    domains: Arc<dyn DomainRepository>,
    channel: Arc<dyn AgentChannel>,
    cipher: Arc<dyn SecretCipher>,
    scheduler: CapacityScheduler,
}

impl DeployDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        builds: Arc<dyn BuildRepository>,
        env_vars: Arc<dyn EnvVarRepository>,
        domains: Arc<dyn DomainRepository>,
        channel: Arc<dyn AgentChannel>,
        cipher: Arc<dyn SecretCipher>,
        scheduler: CapacityScheduler,
    ) -> Self {
        Self {
            applications,
            builds,
            env_vars,
            domains,
            channel,
            cipher,
            scheduler,
        }
    }

    /// 触发一次完整部署
    ///
    /// 节点未分配时调度一次并持久化；节点不可达时不改动任何
    /// 应用/构建行，由调用方决定重试或重新分配。
    pub async fn trigger_deploy(
        &self,
        application_id: Uuid,
        organization_id: Uuid,
    ) -> PlatformResult<DeployReceipt> {
        let app = self
            .applications
            .get_scoped(application_id, organization_id)
            .await?
            .ok_or(PlatformError::ApplicationNotFound { id: application_id })?;

        let runtime = self
            .applications
            .get_runtime(app.runtime_id)
            .await?
            .ok_or_else(|| {
                PlatformError::Internal(format!("应用 {} 引用的运行时不存在", app.id))
            })?;
        let plan = self
            .applications
            .get_plan(app.plan_id)
            .await?
            .ok_or_else(|| {
                PlatformError::Internal(format!("应用 {} 引用的套餐不存在", app.id))
            })?;

        // 节点分配：已有分配直接复用，不再触发调度
        let node_id = match app.node_id {
            Some(node_id) => node_id,
            None => {
                let requirements = ResourceRequirements::from_plan(&plan);
                let node = self
                    .scheduler
                    .select_node(&app.region, &requirements)
                    .await?
                    .ok_or_else(|| PlatformError::NoCapacity {
                        region: app.region.clone(),
                    })?;
                self.applications.assign_node(app.id, node.id).await?;
                info!("应用 {} 调度到节点 {}", app.id, node.id);
                node.id
            }
        };

        // 可达性检查先于任何状态写入，离线时应用/构建行保持原样
        if !self.channel.is_online(node_id).await {
            return Err(PlatformError::NodeOffline { node_id });
        }

        if let Some(active) = self.builds.get_active_for_application(app.id).await? {
            warn!("应用 {} 已有活跃构建 {}，拒绝重复部署", app.id, active.id);
            return Err(PlatformError::BuildInProgress {
                application_id: app.id,
            });
        }

        let build = self.builds.create(&Build::new(app.id)).await?;
        self.applications.set_current_build(app.id, build.id).await?;
        if check_app_transition(app.status, AppStatus::Building).is_ok() {
            self.applications
                .update_status(app.id, AppStatus::Building)
                .await?;
        }

        let task = self.assemble_deploy_task(&app, &runtime, &plan, &build).await?;

        if !self.channel.send_task(node_id, &task).await {
            // 任务已创建但没能送出，把这次构建标记为失败
            self.builds
                .update_status(
                    build.id,
                    platform_core::models::BuildStatus::Failed,
                    None,
                    Some("任务下发失败"),
                    Some(Utc::now()),
                )
                .await?;
            self.applications
                .update_status(app.id, AppStatus::Failed)
                .await?;
            return Err(PlatformError::SendFailed { node_id });
        }

        info!(
            "部署任务已下发: 应用 {} 构建 {} -> 节点 {}",
            app.id, build.id, node_id
        );
        Ok(DeployReceipt {
            node_id,
            build_id: build.id,
        })
    }

    /// 对已部署应用下发控制动作（start/stop/restart/scale）
    ///
    /// 控制任务没有产物，任务键为 `{应用ID}:{时间戳}`。
    pub async fn control(
        &self,
        application_id: Uuid,
        organization_id: Uuid,
        action: ControlAction,
        instances: Option<i32>,
    ) -> PlatformResult<ControlReceipt> {
        let app = self
            .applications
            .get_scoped(application_id, organization_id)
            .await?
            .ok_or(PlatformError::ApplicationNotFound { id: application_id })?;

        let node_id = app.node_id.ok_or(PlatformError::NodeUnassigned {
            application_id: app.id,
        })?;

        if !self.channel.is_online(node_id).await {
            return Err(PlatformError::NodeOffline { node_id });
        }

        let task = TaskDescriptor {
            task_id: format!("{}:{}", app.id, Utc::now().timestamp()),
            application_id: app.id,
            payload: TaskPayload::Control(ControlTask { action, instances }),
        };

        if !self.channel.send_task(node_id, &task).await {
            return Err(PlatformError::SendFailed { node_id });
        }

        // 启停是用户显式指令，送达即落状态；重启与扩缩容不改状态
        match action {
            ControlAction::Stop if check_app_transition(app.status, AppStatus::Stopped).is_ok() => {
                self.applications
                    .update_status(app.id, AppStatus::Stopped)
                    .await?;
            }
            ControlAction::Start if check_app_transition(app.status, AppStatus::Running).is_ok() => {
                self.applications
                    .update_status(app.id, AppStatus::Running)
                    .await?;
            }
            _ => {}
        }

        info!("控制任务已下发: 应用 {} {} -> 节点 {}", app.id, action, node_id);
        Ok(ControlReceipt {
            node_id,
            task_id: task.task_id,
        })
    }

    /// 组装部署任务描述
    ///
    /// 运行时默认值被应用级覆盖项取代；环境变量解密后仅存在于
    /// 任务载荷；域名规范化去重；除非运行时显式允许，容器以
    /// 非root身份运行。
    async fn assemble_deploy_task(
        &self,
        app: &Application,
        runtime: &Runtime,
        plan: &platform_core::models::Plan,
        build: &Build,
    ) -> PlatformResult<TaskDescriptor> {
        let mut env = BTreeMap::new();
        for var in self.env_vars.list_for_application(app.id).await? {
            env.insert(var.key, self.cipher.decrypt(&var.encrypted_value)?);
        }

        let domains: BTreeSet<String> = self
            .domains
            .list_for_application(app.id)
            .await?
            .into_iter()
            .map(|d| platform_core::models::domain::normalize_hostname(&d.hostname))
            .collect();

        let build_command = app
            .build_command
            .clone()
            .unwrap_or_else(|| runtime.default_build_command.clone());
        let start_command = app
            .start_command
            .clone()
            .unwrap_or_else(|| runtime.default_start_command.clone());

        Ok(TaskDescriptor {
            task_id: build.id.to_string(),
            application_id: app.id,
            payload: TaskPayload::Deploy(DeployTask {
                build_id: build.id,
                git_url: app.git_url.clone(),
                git_branch: app.git_branch.clone(),
                git_commit: app.git_commit.clone(),
                base_image: runtime.base_image.clone(),
                build_command,
                start_command,
                port: runtime.port,
                cpu_millis: plan.cpu_millis,
                memory_mb: plan.memory_mb,
                disk_mb: plan.disk_mb,
                instances: app.instances,
                env,
                domains: domains.into_iter().collect(),
                run_as_root: runtime.allow_root,
            }),
        })
    }
}
