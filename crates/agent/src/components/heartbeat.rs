//! 心跳采样与上报
//!
//! 周期采样节点资源用量与逐应用指标并上报控制面。单次上报失败
//! 只记录不中断循环，控制面靠心跳超窗把节点判为离线。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use platform_core::errors::PlatformResult;
use platform_core::models::{AppRuntimeMetric, ResourceUsage};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::build_pipeline::CommandRunner;
use super::control_client::ControlPlaneClient;

/// 资源用量采样接口
#[async_trait]
pub trait UsageSampler: Send + Sync {
    async fn sample(&self) -> PlatformResult<(ResourceUsage, Vec<AppRuntimeMetric>)>;
}

/// 基于docker的用量采样
///
/// 容器数取自 `docker ps`，CPU/内存/磁盘的细粒度采样接入节点的
/// 监控代理，这里上报容器计数即可满足调度的容量判断。
pub struct DockerUsageSampler {
    runner: Arc<dyn CommandRunner>,
}

impl DockerUsageSampler {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl UsageSampler for DockerUsageSampler {
    async fn sample(&self) -> PlatformResult<(ResourceUsage, Vec<AppRuntimeMetric>)> {
        let output = self
            .runner
            .run("docker", &["ps".to_string(), "-q".to_string()], None)
            .await?;
        let container_count = if output.success {
            output.stdout.lines().filter(|l| !l.trim().is_empty()).count() as i32
        } else {
            0
        };

        Ok((
            ResourceUsage {
                container_count,
                ..ResourceUsage::default()
            },
            Vec::new(),
        ))
    }
}

/// 心跳循环，收到停机信号后退出
pub async fn run_heartbeat_loop(
    client: Arc<ControlPlaneClient>,
    sampler: Arc<dyn UsageSampler>,
    interval_seconds: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
    info!("心跳循环启动: 间隔 {}s", interval_seconds);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (usage, metrics) = match sampler.sample().await {
                    Ok(sampled) => sampled,
                    Err(e) => {
                        warn!("资源采样失败: {}", e);
                        continue;
                    }
                };
                match client.heartbeat(&usage, &metrics).await {
                    Ok(()) => debug!("心跳已上报: {} 个容器", usage.container_count),
                    Err(e) => warn!("心跳上报失败: {}", e),
                }
            }
            _ = shutdown.recv() => {
                info!("心跳循环收到停机信号");
                break;
            }
        }
    }
}
