use async_trait::async_trait;
use chrono::{DateTime, Utc};
use platform_core::{
    errors::{PlatformError, PlatformResult},
    models::{NodeStatus, ResourceUsage, WorkerNode},
    traits::NodeRepository,
};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL节点仓储实现
pub struct PostgresNodeRepository {
    pool: PgPool,
}

const NODE_COLUMNS: &str = "id, region, host_address, signing_secret, status, \
     cpu_total_millis, memory_total_mb, disk_total_mb, \
     cpu_used_millis, memory_used_mb, disk_used_mb, \
     container_count, last_heartbeat, registered_at";

impl PostgresNodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 将数据库行转换为WorkerNode模型
    fn row_to_node(row: &sqlx::postgres::PgRow) -> PlatformResult<WorkerNode> {
        Ok(WorkerNode {
            id: row.try_get("id")?,
            region: row.try_get("region")?,
            host_address: row.try_get("host_address")?,
            signing_secret: row.try_get("signing_secret")?,
            status: row.try_get("status")?,
            cpu_total_millis: row.try_get("cpu_total_millis")?,
            memory_total_mb: row.try_get("memory_total_mb")?,
            disk_total_mb: row.try_get("disk_total_mb")?,
            cpu_used_millis: row.try_get("cpu_used_millis")?,
            memory_used_mb: row.try_get("memory_used_mb")?,
            disk_used_mb: row.try_get("disk_used_mb")?,
            container_count: row.try_get("container_count")?,
            last_heartbeat: row.try_get("last_heartbeat")?,
            registered_at: row.try_get("registered_at")?,
        })
    }
}

#[async_trait]
impl NodeRepository for PostgresNodeRepository {
    async fn create(&self, node: &WorkerNode) -> PlatformResult<WorkerNode> {
        sqlx::query(
            r#"
            INSERT INTO worker_nodes (id, region, host_address, signing_secret, status,
                cpu_total_millis, memory_total_mb, disk_total_mb,
                cpu_used_millis, memory_used_mb, disk_used_mb,
                container_count, last_heartbeat, registered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(node.id)
        .bind(&node.region)
        .bind(&node.host_address)
        .bind(&node.signing_secret)
        .bind(node.status)
        .bind(node.cpu_total_millis)
        .bind(node.memory_total_mb)
        .bind(node.disk_total_mb)
        .bind(node.cpu_used_millis)
        .bind(node.memory_used_mb)
        .bind(node.disk_used_mb)
        .bind(node.container_count)
        .bind(node.last_heartbeat)
        .bind(node.registered_at)
        .execute(&self.pool)
        .await?;

        debug!("注册节点成功: {}", node.id);
        Ok(node.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> PlatformResult<Option<WorkerNode>> {
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM worker_nodes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_node).transpose()
    }

    async fn list_all(&self) -> PlatformResult<Vec<WorkerNode>> {
        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM worker_nodes ORDER BY registered_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_node).collect()
    }

    async fn list_by_region(&self, region: &str) -> PlatformResult<Vec<WorkerNode>> {
        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM worker_nodes WHERE region = $1 ORDER BY id"
        ))
        .bind(region)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_node).collect()
    }

    async fn record_heartbeat(
        &self,
        node_id: Uuid,
        usage: &ResourceUsage,
        at: DateTime<Utc>,
    ) -> PlatformResult<bool> {
        // 心跳同时把PENDING/OFFLINE节点拉回ONLINE，DISABLED不受影响
        let result = sqlx::query(
            r#"
            UPDATE worker_nodes
            SET cpu_used_millis = $2, memory_used_mb = $3, disk_used_mb = $4,
                container_count = $5, last_heartbeat = $6,
                status = CASE WHEN status = 'DISABLED' THEN status ELSE 'ONLINE' END
            WHERE id = $1
            "#,
        )
        .bind(node_id)
        .bind(usage.cpu_used_millis)
        .bind(usage.memory_used_mb)
        .bind(usage.disk_used_mb)
        .bind(usage.container_count)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_status(&self, node_id: Uuid, status: NodeStatus) -> PlatformResult<()> {
        let result = sqlx::query("UPDATE worker_nodes SET status = $2 WHERE id = $1")
            .bind(node_id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PlatformError::NodeNotFound { id: node_id });
        }

        debug!("更新节点状态成功: {} -> {}", node_id, status);
        Ok(())
    }

    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> PlatformResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE worker_nodes
            SET status = 'OFFLINE'
            WHERE status = 'ONLINE'
              AND (last_heartbeat IS NULL OR last_heartbeat < $1)
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_assigned_applications(&self, node_id: Uuid) -> PlatformResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM applications WHERE node_id = $1")
            .bind(node_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<i64, _>("count")?)
    }

    async fn delete(&self, node_id: Uuid) -> PlatformResult<()> {
        let result = sqlx::query("DELETE FROM worker_nodes WHERE id = $1")
            .bind(node_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PlatformError::NodeNotFound { id: node_id });
        }

        debug!("删除节点成功: {}", node_id);
        Ok(())
    }
}
