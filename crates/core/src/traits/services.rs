//! 控制面内部服务接口
//!
//! 任务通道、指标转发与密文加解密的抽象。具体实现位于
//! infrastructure crate，测试中以mock替换。

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::PlatformResult;
use crate::models::{AppRuntimeMetric, TaskDescriptor};

/// 任务通道：控制面到节点代理的下行链路
///
/// 每个在线节点维护一条长连接。`send_task` 返回true只表示任务帧
/// 已写入传输层，不代表代理处理成功。连接断开必须立即注销节点，
/// 使后续发送快速失败而不是挂起。
#[async_trait]
pub trait AgentChannel: Send + Sync {
    /// 向节点发送一个任务帧，节点无连接或写入失败返回false
    async fn send_task(&self, node_id: Uuid, task: &TaskDescriptor) -> bool;

    /// 节点是否有活跃连接，分发器在发送前用它快速失败
    async fn is_online(&self, node_id: Uuid) -> bool;
}

/// 应用运行时指标转发接口
///
/// 心跳中的逐应用指标转发给外部收集器，不落在节点行上。
#[async_trait]
pub trait MetricsRecorder: Send + Sync {
    async fn record_many(&self, metrics: Vec<AppRuntimeMetric>) -> PlatformResult<()>;
}

/// 环境变量值的加解密接口
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> PlatformResult<String>;

    fn decrypt(&self, ciphertext: &str) -> PlatformResult<String>;
}
