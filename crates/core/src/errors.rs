use thiserror::Error;
use uuid::Uuid;

/// 控制面错误类型定义
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("应用未找到: {id}")]
    ApplicationNotFound { id: Uuid },

    #[error("构建未找到: {id}")]
    BuildNotFound { id: Uuid },

    #[error("节点未找到: {id}")]
    NodeNotFound { id: Uuid },

    #[error("数据库实例未找到: {id}")]
    ManagedDatabaseNotFound { id: Uuid },

    #[error("域名未找到: {id}")]
    DomainNotFound { id: Uuid },

    #[error("区域 {region} 没有满足资源需求的可用节点")]
    NoCapacity { region: String },

    #[error("节点 {node_id} 没有在线的任务通道")]
    NodeOffline { node_id: Uuid },

    #[error("任务下发到节点 {node_id} 失败")]
    SendFailed { node_id: Uuid },

    #[error("应用 {application_id} 尚未分配节点")]
    NodeUnassigned { application_id: Uuid },

    #[error("应用 {application_id} 已有进行中的构建")]
    BuildInProgress { application_id: Uuid },

    #[error("非法状态迁移: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("节点认证失败: {0}")]
    Unauthorized(String),

    #[error("无效的注册令牌")]
    InvalidRegistrationToken,

    #[error("加密错误: {0}")]
    Crypto(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("无效的环境变量键: {key}")]
    InvalidEnvKey { key: String },

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;
