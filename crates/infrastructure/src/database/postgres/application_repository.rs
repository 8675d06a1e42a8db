use async_trait::async_trait;
use platform_core::{
    errors::{PlatformError, PlatformResult},
    models::{AppStatus, Application, Plan, Runtime},
    traits::ApplicationRepository,
};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL应用仓储实现
pub struct PostgresApplicationRepository {
    pool: PgPool,
}

const APP_COLUMNS: &str = "id, organization_id, name, region, node_id, runtime_id, plan_id, \
     current_build_id, status, instances, needs_redeploy, \
     git_url, git_branch, git_commit, build_command, start_command, created_at";

impl PostgresApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_application(row: &sqlx::postgres::PgRow) -> PlatformResult<Application> {
        Ok(Application {
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            name: row.try_get("name")?,
            region: row.try_get("region")?,
            node_id: row.try_get("node_id")?,
            runtime_id: row.try_get("runtime_id")?,
            plan_id: row.try_get("plan_id")?,
            current_build_id: row.try_get("current_build_id")?,
            status: row.try_get("status")?,
            instances: row.try_get("instances")?,
            needs_redeploy: row.try_get("needs_redeploy")?,
            git_url: row.try_get("git_url")?,
            git_branch: row.try_get("git_branch")?,
            git_commit: row.try_get("git_commit")?,
            build_command: row.try_get("build_command")?,
            start_command: row.try_get("start_command")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl ApplicationRepository for PostgresApplicationRepository {
    async fn get_by_id(&self, id: Uuid) -> PlatformResult<Option<Application>> {
        let row = sqlx::query(&format!(
            "SELECT {APP_COLUMNS} FROM applications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_application).transpose()
    }

    async fn get_scoped(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> PlatformResult<Option<Application>> {
        // 租户隔离：组织不匹配与不存在同样返回None
        let row = sqlx::query(&format!(
            "SELECT {APP_COLUMNS} FROM applications WHERE id = $1 AND organization_id = $2"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_application).transpose()
    }

    async fn update_status(&self, id: Uuid, status: AppStatus) -> PlatformResult<()> {
        let result = sqlx::query("UPDATE applications SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PlatformError::ApplicationNotFound { id });
        }

        debug!("更新应用状态成功: {} -> {}", id, status);
        Ok(())
    }

    async fn assign_node(&self, id: Uuid, node_id: Uuid) -> PlatformResult<()> {
        let result = sqlx::query("UPDATE applications SET node_id = $2 WHERE id = $1")
            .bind(id)
            .bind(node_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PlatformError::ApplicationNotFound { id });
        }

        debug!("应用 {} 分配到节点 {}", id, node_id);
        Ok(())
    }

    async fn set_current_build(&self, id: Uuid, build_id: Uuid) -> PlatformResult<()> {
        let result = sqlx::query("UPDATE applications SET current_build_id = $2 WHERE id = $1")
            .bind(id)
            .bind(build_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PlatformError::ApplicationNotFound { id });
        }

        Ok(())
    }

    async fn set_needs_redeploy(&self, id: Uuid, needs_redeploy: bool) -> PlatformResult<()> {
        let result = sqlx::query("UPDATE applications SET needs_redeploy = $2 WHERE id = $1")
            .bind(id)
            .bind(needs_redeploy)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PlatformError::ApplicationNotFound { id });
        }

        Ok(())
    }

    async fn get_runtime(&self, id: Uuid) -> PlatformResult<Option<Runtime>> {
        let row = sqlx::query(
            "SELECT id, name, base_image, default_build_command, default_start_command, port, allow_root FROM runtimes WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Runtime {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                base_image: row.try_get("base_image")?,
                default_build_command: row.try_get("default_build_command")?,
                default_start_command: row.try_get("default_start_command")?,
                port: row.try_get("port")?,
                allow_root: row.try_get("allow_root")?,
            })
        })
        .transpose()
    }

    async fn get_plan(&self, id: Uuid) -> PlatformResult<Option<Plan>> {
        let row = sqlx::query("SELECT id, name, cpu_millis, memory_mb, disk_mb FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(Plan {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                cpu_millis: row.try_get("cpu_millis")?,
                memory_mb: row.try_get("memory_mb")?,
                disk_mb: row.try_get("disk_mb")?,
            })
        })
        .transpose()
    }
}
