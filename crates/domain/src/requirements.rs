//! 调度资源需求
//!
//! 需求来自应用的资源套餐，每个维度都是可选提示：未指定的维度
//! 不参与容量过滤。

use platform_core::models::{Plan, WorkerNode};
use serde::{Deserialize, Serialize};

/// 一次调度的资源需求提示
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub cpu_millis: Option<i64>,
    pub memory_mb: Option<i64>,
    pub disk_mb: Option<i64>,
}

impl ResourceRequirements {
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            cpu_millis: Some(plan.cpu_millis),
            memory_mb: Some(plan.memory_mb),
            disk_mb: Some(plan.disk_mb),
        }
    }

    /// 节点加上本需求后是否仍在每个指定维度的总容量之内
    ///
    /// 软性校验：`used <= total` 不由数据库事务强制。
    pub fn fits(&self, node: &WorkerNode) -> bool {
        if let Some(cpu) = self.cpu_millis {
            if node.cpu_used_millis + cpu > node.cpu_total_millis {
                return false;
            }
        }
        if let Some(memory) = self.memory_mb {
            if node.memory_used_mb + memory > node.memory_total_mb {
                return false;
            }
        }
        if let Some(disk) = self.disk_mb {
            if node.disk_used_mb + disk > node.disk_total_mb {
                return false;
            }
        }
        true
    }
}
