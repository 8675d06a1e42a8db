//! 容量感知调度
//!
//! 从目标区域的在线节点中，过滤掉加上资源需求后任一维度超出
//! 总容量的节点，在剩余候选中选剩余容量最大的（最小负载启发），
//! 平局时取节点ID最小者保证确定性。没有合格节点返回None，这是
//! 正常的"无容量"结果而不是错误。

use std::sync::Arc;

use platform_core::errors::PlatformResult;
use platform_core::models::{NodeStatus, WorkerNode};
use platform_core::traits::NodeRepository;
use platform_domain::ResourceRequirements;
use tracing::debug;

pub struct CapacityScheduler {
    nodes: Arc<dyn NodeRepository>,
    /// 心跳存活窗口（秒），超过即不参与调度
    node_offline_seconds: i64,
}

impl CapacityScheduler {
    pub fn new(nodes: Arc<dyn NodeRepository>, node_offline_seconds: i64) -> Self {
        Self {
            nodes,
            node_offline_seconds,
        }
    }

    /// 为指定区域与资源需求选择一个节点
    pub async fn select_node(
        &self,
        region: &str,
        requirements: &ResourceRequirements,
    ) -> PlatformResult<Option<WorkerNode>> {
        let candidates = self.nodes.list_by_region(region).await?;

        let mut eligible: Vec<WorkerNode> = candidates
            .into_iter()
            .filter(|node| {
                node.status == NodeStatus::Online
                    && node.heartbeat_within(self.node_offline_seconds)
                    && requirements.fits(node)
            })
            .collect();

        if eligible.is_empty() {
            debug!("区域 {} 没有满足需求的在线节点", region);
            return Ok(None);
        }

        // 剩余容量大者优先，平局取ID最小者
        eligible.sort_by(|a, b| {
            free_score(b)
                .cmp(&free_score(a))
                .then_with(|| a.id.cmp(&b.id))
        });

        let selected = eligible.into_iter().next();
        if let Some(node) = &selected {
            debug!("调度选中节点 {} (区域 {})", node.id, region);
        }
        Ok(selected)
    }
}

fn free_score(node: &WorkerNode) -> i64 {
    node.free_cpu_millis() + node.free_memory_mb() + node.free_disk_mb()
}
