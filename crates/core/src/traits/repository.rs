//! 数据仓储层接口定义
//!
//! 定义持久化层的核心抽象，包括：
//! - 节点仓储 (NodeRepository) 与注册令牌仓储 (RegistrationTokenRepository)
//! - 应用仓储 (ApplicationRepository)
//! - 构建仓储 (BuildRepository)
//! - 环境变量/域名/托管数据库仓储
//!
//! ## 设计原则
//!
//! 每个仓储接口职责单一，只负责特定实体的数据操作；所有操作
//! 异步执行并返回 `PlatformResult<T>` 统一错误处理；接口与实现
//! 分离，生产环境使用 PostgreSQL 实现，测试使用内存实现。
//!
//! 数据库是唯一的持久状态权威：仓储之外不允许缓存应用/构建
//! 状态并当作权威使用。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::PlatformResult;
use crate::models::{
    AppDomain, AppStatus, Application, BackupRecord, Build, BuildStatus, EnvironmentVariable,
    ManagedDatabase, NodeStatus, Plan, RegistrationToken, ResourceUsage, Runtime, SslStatus,
    WorkerNode,
};

/// 节点仓储接口
///
/// 负责Worker节点的注册、心跳更新与状态管理。节点在仍被应用
/// 引用时不允许删除。
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// 持久化新注册的节点
    async fn create(&self, node: &WorkerNode) -> PlatformResult<WorkerNode>;

    /// 按ID查询节点
    async fn get_by_id(&self, id: Uuid) -> PlatformResult<Option<WorkerNode>>;

    /// 列出全部节点
    async fn list_all(&self) -> PlatformResult<Vec<WorkerNode>>;

    /// 列出指定区域的节点
    async fn list_by_region(&self, region: &str) -> PlatformResult<Vec<WorkerNode>>;

    /// 记录一次心跳：更新资源用量与心跳时间
    ///
    /// 未知节点返回 `Ok(false)`，不产生任何副作用。
    async fn record_heartbeat(
        &self,
        node_id: Uuid,
        usage: &ResourceUsage,
        at: DateTime<Utc>,
    ) -> PlatformResult<bool>;

    /// 管理员显式设置节点状态
    async fn update_status(&self, node_id: Uuid, status: NodeStatus) -> PlatformResult<()>;

    /// 将心跳早于 `cutoff` 的在线节点标记为离线，返回受影响的数量
    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> PlatformResult<u64>;

    /// 统计仍分配在该节点上的应用数量
    async fn count_assigned_applications(&self, node_id: Uuid) -> PlatformResult<i64>;

    /// 删除节点，调用方必须先确认没有应用引用它
    async fn delete(&self, node_id: Uuid) -> PlatformResult<()>;
}

/// 注册令牌仓储接口
///
/// 令牌由管理员离线签发，单次有效。
#[async_trait]
pub trait RegistrationTokenRepository: Send + Sync {
    /// 签发新令牌
    async fn create(&self, token: &RegistrationToken) -> PlatformResult<()>;

    /// 原子地消费一个未过期的令牌
    ///
    /// 成功时删除令牌并返回其内容，令牌不存在或已过期返回 `None`。
    /// 同一令牌的第二次消费必须失败。
    async fn consume(&self, token: &str, now: DateTime<Utc>)
        -> PlatformResult<Option<RegistrationToken>>;
}

/// 应用仓储接口
///
/// `node_id` 与 `status` 只应由分发器路径写入。运行时模板与资源
/// 套餐是只读参考数据，随应用一起在分发时加载。
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// 按ID查询应用，不做租户过滤
    async fn get_by_id(&self, id: Uuid) -> PlatformResult<Option<Application>>;

    /// 按ID查询应用，并校验归属组织
    ///
    /// 跨租户的ID组合永远解析为 `None`。
    async fn get_scoped(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> PlatformResult<Option<Application>>;

    /// 更新应用状态
    async fn update_status(&self, id: Uuid, status: AppStatus) -> PlatformResult<()>;

    /// 持久化调度结果
    async fn assign_node(&self, id: Uuid, node_id: Uuid) -> PlatformResult<()>;

    /// 指向最近一次尝试的构建
    async fn set_current_build(&self, id: Uuid, build_id: Uuid) -> PlatformResult<()>;

    /// 设置或清除待重新部署标记
    async fn set_needs_redeploy(&self, id: Uuid, needs_redeploy: bool) -> PlatformResult<()>;

    /// 查询运行时模板
    async fn get_runtime(&self, id: Uuid) -> PlatformResult<Option<Runtime>>;

    /// 查询资源套餐
    async fn get_plan(&self, id: Uuid) -> PlatformResult<Option<Plan>>;
}

/// 构建仓储接口
#[async_trait]
pub trait BuildRepository: Send + Sync {
    /// 持久化新构建
    async fn create(&self, build: &Build) -> PlatformResult<Build>;

    /// 按ID查询构建
    async fn get_by_id(&self, id: Uuid) -> PlatformResult<Option<Build>>;

    /// 查询应用当前的活跃构建（QUEUED/BUILDING）
    async fn get_active_for_application(
        &self,
        application_id: Uuid,
    ) -> PlatformResult<Option<Build>>;

    /// 更新构建状态与产物信息
    ///
    /// 终态保护由回调处理方在更新前校验，仓储本身不做判断。
    async fn update_status(
        &self,
        id: Uuid,
        status: BuildStatus,
        image_tag: Option<&str>,
        error_message: Option<&str>,
        finished_at: Option<DateTime<Utc>>,
    ) -> PlatformResult<()>;

    /// 追加构建日志
    async fn append_log(&self, id: Uuid, chunk: &str) -> PlatformResult<()>;
}

/// 环境变量仓储接口，值始终以密文形式存取
#[async_trait]
pub trait EnvVarRepository: Send + Sync {
    /// 按 (application_id, key) 插入或覆盖
    async fn upsert(&self, var: &EnvironmentVariable) -> PlatformResult<()>;

    /// 列出应用的全部环境变量
    async fn list_for_application(
        &self,
        application_id: Uuid,
    ) -> PlatformResult<Vec<EnvironmentVariable>>;

    /// 删除单个键
    async fn delete(&self, application_id: Uuid, key: &str) -> PlatformResult<()>;
}

/// 域名仓储接口
#[async_trait]
pub trait DomainRepository: Send + Sync {
    async fn create(&self, domain: &AppDomain) -> PlatformResult<()>;

    async fn list_for_application(&self, application_id: Uuid) -> PlatformResult<Vec<AppDomain>>;

    /// DNS验证通过
    async fn mark_verified(&self, id: Uuid) -> PlatformResult<()>;

    /// 推进SSL证书状态
    async fn update_ssl_status(&self, id: Uuid, status: SslStatus) -> PlatformResult<()>;

    /// 节点回报证书激活：按主机名批量置为ACTIVE，返回命中数量
    async fn mark_ssl_active_by_hostnames(
        &self,
        application_id: Uuid,
        hostnames: &[String],
    ) -> PlatformResult<u64>;
}

/// 托管数据库仓储接口
#[async_trait]
pub trait ManagedDatabaseRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> PlatformResult<Option<ManagedDatabase>>;

    /// 记录节点上报的一次备份
    async fn record_backup(&self, record: &BackupRecord) -> PlatformResult<()>;

    async fn list_backups(&self, database_id: Uuid) -> PlatformResult<Vec<BackupRecord>>;
}
