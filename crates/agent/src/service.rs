//! 代理服务
//!
//! 启动流程：加载或注册节点身份，起心跳循环，然后维持任务通道
//! 长连接。连接断开按配置的退避间隔重连。部署任务以任务ID去重，
//! 控制面重复投递同一构建不会触发第二次执行。

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use platform_core::config::AgentConfig;
use platform_core::errors::{PlatformError, PlatformResult};
use platform_core::models::{TaskDescriptor, TaskPayload, TaskStatusReport};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::components::build_pipeline::{BuildPipeline, LogSink, ShellRunner};
use crate::components::control_client::{
    CapacityReport, ControlPlaneClient, NodeIdentity,
};
use crate::components::heartbeat::{run_heartbeat_loop, DockerUsageSampler, UsageSampler};

pub struct AgentService {
    config: AgentConfig,
    client: Arc<ControlPlaneClient>,
    pipeline: Arc<BuildPipeline>,
    sampler: Arc<dyn UsageSampler>,
    /// 已执行过的部署任务ID，重复投递据此去重
    completed_tasks: Arc<RwLock<HashSet<String>>>,
}

impl AgentService {
    /// 加载身份并组装代理，身份文件缺失时用注册令牌注册
    pub async fn bootstrap(config: AgentConfig) -> PlatformResult<Self> {
        let identity_file = PathBuf::from(&config.identity_file);
        let identity = match NodeIdentity::load(&identity_file)? {
            Some(identity) => {
                info!("加载节点身份: {}", identity.node_id);
                identity
            }
            None => {
                let token = config.registration_token.as_deref().ok_or_else(|| {
                    PlatformError::Configuration(
                        "身份文件不存在且未配置注册令牌，无法注册节点".to_string(),
                    )
                })?;
                ControlPlaneClient::register(
                    &config.control_plane_url,
                    token,
                    &config.host_address,
                    &CapacityReport::default(),
                    &identity_file,
                )
                .await?
            }
        };

        let runner = Arc::new(ShellRunner);
        let client = Arc::new(ControlPlaneClient::new(
            config.control_plane_url.clone(),
            identity,
        ));
        let pipeline = Arc::new(BuildPipeline::new(runner.clone(), &config.workspace_dir));
        let sampler = Arc::new(DockerUsageSampler::new(runner));

        Ok(Self {
            config,
            client,
            pipeline,
            sampler,
            completed_tasks: Arc::new(RwLock::new(HashSet::new())),
        })
    }

    pub fn node_id(&self) -> Uuid {
        self.client.node_id()
    }

    /// 运行代理直到收到停机信号
    pub async fn run(&self, shutdown: broadcast::Sender<()>) {
        let heartbeat_client = Arc::clone(&self.client);
        let sampler = Arc::clone(&self.sampler);
        let interval = self.config.heartbeat_interval_seconds;
        let heartbeat_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            run_heartbeat_loop(heartbeat_client, sampler, interval, heartbeat_shutdown).await;
        });

        let mut channel_shutdown = shutdown.subscribe();
        let reconnect = std::time::Duration::from_secs(self.config.reconnect_delay_seconds);
        loop {
            tokio::select! {
                connected = self.client.connect_channel() => {
                    match connected {
                        Ok(stream) => {
                            info!("任务通道已连接");
                            self.pump_channel(stream, shutdown.subscribe()).await;
                            warn!("任务通道断开，{:?} 后重连", reconnect);
                        }
                        Err(e) => {
                            warn!("任务通道连接失败: {}，{:?} 后重试", e, reconnect);
                        }
                    }
                }
                _ = channel_shutdown.recv() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(reconnect) => {}
                _ = channel_shutdown.recv() => break,
            }
        }
        info!("代理服务已停止");
    }

    async fn pump_channel(
        &self,
        mut stream: crate::components::control_client::ChannelStream,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                message = stream.next() => {
                    match message {
                        Some(Ok(Message::Text(frame))) => {
                            match serde_json::from_str::<TaskDescriptor>(&frame) {
                                Ok(task) => self.handle_task(task).await,
                                Err(e) => warn!("无法解析的任务帧: {}", e),
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = stream.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("任务通道读取错误: {}", e);
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    let _ = stream.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    async fn handle_task(&self, task: TaskDescriptor) {
        match &task.payload {
            TaskPayload::Deploy(deploy) => {
                {
                    let completed = self.completed_tasks.read().await;
                    if completed.contains(&task.task_id) {
                        info!("任务 {} 已执行过，忽略重复投递", task.task_id);
                        return;
                    }
                }

                let build_id = deploy.build_id;
                info!("收到部署任务 {} (应用 {})", task.task_id, task.application_id);
                let _ = self
                    .client
                    .report_task_status(
                        build_id,
                        &TaskStatusReport {
                            status: "building".to_string(),
                            image_tag: None,
                            error: None,
                        },
                    )
                    .await;

                let sink = CallbackLogSink {
                    client: Arc::clone(&self.client),
                    build_id,
                };
                let result = self
                    .pipeline
                    .execute(&task.task_id, task.application_id, deploy, &sink)
                    .await;

                self.completed_tasks
                    .write()
                    .await
                    .insert(task.task_id.clone());

                let report = match result {
                    Ok(image_tag) => TaskStatusReport {
                        status: "success".to_string(),
                        image_tag: Some(image_tag),
                        error: None,
                    },
                    Err(e) => {
                        error!("部署任务 {} 失败: {}", task.task_id, e);
                        TaskStatusReport {
                            status: "failed".to_string(),
                            image_tag: None,
                            error: Some(e.to_string()),
                        }
                    }
                };
                if let Err(e) = self.client.report_task_status(build_id, &report).await {
                    error!("构建 {} 状态回报失败: {}", build_id, e);
                }
            }
            TaskPayload::Control(control) => {
                info!(
                    "收到控制任务 {}: {} (应用 {})",
                    task.task_id, control.action, task.application_id
                );
                if let Err(e) = self
                    .pipeline
                    .apply_control(task.application_id, control.action, control.instances)
                    .await
                {
                    error!("控制任务 {} 执行失败: {}", task.task_id, e);
                }
            }
        }
    }
}

/// 把流水线日志块转发为构建日志回调
struct CallbackLogSink {
    client: Arc<ControlPlaneClient>,
    build_id: Uuid,
}

#[async_trait::async_trait]
impl LogSink for CallbackLogSink {
    async fn chunk(&self, chunk: &str) {
        if let Err(e) = self.client.send_build_log(self.build_id, chunk).await {
            warn!("构建 {} 日志回传失败: {}", self.build_id, e);
        }
    }
}
