//! 任务通道注册表
//!
//! 每个在线节点对应一条长连接，连接的写端注册在这里。发送是
//! 非阻塞尽力而为：节点无连接立即返回false，由调用方映射为
//! node_offline。连接断开（代理主动断开或网络掉线）必须注销
//! 节点，后续发送快速失败而不是挂起。

use async_trait::async_trait;
use platform_core::models::TaskDescriptor;
use platform_core::traits::AgentChannel;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// 单节点任务队列深度，超出即视为发送失败
const LINK_BUFFER: usize = 64;

/// 在线节点连接注册表
#[derive(Default)]
pub struct AgentLinkRegistry {
    links: RwLock<HashMap<Uuid, mpsc::Sender<TaskDescriptor>>>,
}

impl AgentLinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册节点连接，返回该连接的任务接收端
    ///
    /// 同一节点重复注册时旧连接被替换，旧接收端随之关闭。
    pub async fn register(&self, node_id: Uuid) -> mpsc::Receiver<TaskDescriptor> {
        let (tx, rx) = mpsc::channel(LINK_BUFFER);
        let replaced = self.links.write().await.insert(node_id, tx);
        if replaced.is_some() {
            debug!("节点 {} 重新建立连接，替换旧通道", node_id);
        }
        rx
    }

    /// 注销节点连接
    pub async fn deregister(&self, node_id: Uuid) {
        if self.links.write().await.remove(&node_id).is_some() {
            debug!("节点 {} 的任务通道已注销", node_id);
        }
    }

    /// 当前持有连接的节点数
    pub async fn connected_count(&self) -> usize {
        self.links.read().await.len()
    }
}

#[async_trait]
impl AgentChannel for AgentLinkRegistry {
    async fn send_task(&self, node_id: Uuid, task: &TaskDescriptor) -> bool {
        let sender = match self.links.read().await.get(&node_id) {
            Some(tx) => tx.clone(),
            None => return false,
        };

        match sender.try_send(task.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // 接收端已消失，顺手注销避免后续反复失败
                warn!("节点 {} 的任务通道已关闭，注销连接", node_id);
                self.deregister(node_id).await;
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("节点 {} 的任务通道已满，任务 {} 丢弃", node_id, task.task_id);
                false
            }
        }
    }

    async fn is_online(&self, node_id: Uuid) -> bool {
        match self.links.read().await.get(&node_id) {
            Some(tx) => !tx.is_closed(),
            None => false,
        }
    }
}
