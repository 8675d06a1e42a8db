//! 节点失联监控
//!
//! 周期扫描把心跳超窗的在线节点标记为OFFLINE。读路径（调度）
//! 直接按心跳时间判断在线，这里只负责把持久状态收敛，供管理
//! 面板与报警使用。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use platform_core::traits::NodeRepository;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub struct NodeMonitor {
    nodes: Arc<dyn NodeRepository>,
    scan_interval: Duration,
    node_offline_seconds: i64,
}

impl NodeMonitor {
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        scan_interval_seconds: u64,
        node_offline_seconds: i64,
    ) -> Self {
        Self {
            nodes,
            scan_interval: Duration::from_secs(scan_interval_seconds),
            node_offline_seconds,
        }
    }

    /// 运行监控循环直到收到停机信号
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.scan_interval);
        info!(
            "节点监控启动: 扫描间隔 {:?}, 离线阈值 {}s",
            self.scan_interval, self.node_offline_seconds
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                _ = shutdown.recv() => {
                    info!("节点监控收到停机信号");
                    break;
                }
            }
        }
    }

    /// 单次扫描
    pub async fn sweep_once(&self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.node_offline_seconds);
        match self.nodes.mark_stale_offline(cutoff).await {
            Ok(0) => {}
            Ok(count) => warn!("{} 个节点心跳超窗，已标记为OFFLINE", count),
            Err(e) => error!("节点失联扫描失败: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use platform_core::models::{NodeStatus, WorkerNode};
    use platform_infrastructure::memory::MemoryNodeRepository;
    use uuid::Uuid;

    fn node(status: NodeStatus, heartbeat_age_seconds: i64) -> WorkerNode {
        WorkerNode {
            id: Uuid::new_v4(),
            region: "us-east".to_string(),
            host_address: "10.0.0.1".to_string(),
            signing_secret: "s".to_string(),
            status,
            cpu_total_millis: 1000,
            memory_total_mb: 1024,
            disk_total_mb: 1024,
            cpu_used_millis: 0,
            memory_used_mb: 0,
            disk_used_mb: 0,
            container_count: 0,
            last_heartbeat: Some(Utc::now() - chrono::Duration::seconds(heartbeat_age_seconds)),
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn marks_only_stale_online_nodes() {
        let repo = Arc::new(MemoryNodeRepository::new());
        let fresh = node(NodeStatus::Online, 10);
        let stale = node(NodeStatus::Online, 300);
        let disabled = node(NodeStatus::Disabled, 300);
        let (fresh_id, stale_id, disabled_id) = (fresh.id, stale.id, disabled.id);
        for n in [fresh, stale, disabled] {
            repo.create(&n).await.unwrap();
        }

        let monitor = NodeMonitor::new(repo.clone(), 30, 90);
        monitor.sweep_once().await;

        assert_eq!(
            repo.get_by_id(fresh_id).await.unwrap().unwrap().status,
            NodeStatus::Online
        );
        assert_eq!(
            repo.get_by_id(stale_id).await.unwrap().unwrap().status,
            NodeStatus::Offline
        );
        assert_eq!(
            repo.get_by_id(disabled_id).await.unwrap().unwrap().status,
            NodeStatus::Disabled
        );
    }
}
