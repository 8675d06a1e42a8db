use async_trait::async_trait;
use chrono::{DateTime, Utc};
use platform_core::{
    errors::{PlatformError, PlatformResult},
    models::{Build, BuildStatus},
    traits::BuildRepository,
};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL构建仓储实现
pub struct PostgresBuildRepository {
    pool: PgPool,
}

const BUILD_COLUMNS: &str =
    "id, application_id, status, image_tag, build_log, error_message, started_at, finished_at";

impl PostgresBuildRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_build(row: &sqlx::postgres::PgRow) -> PlatformResult<Build> {
        Ok(Build {
            id: row.try_get("id")?,
            application_id: row.try_get("application_id")?,
            status: row.try_get("status")?,
            image_tag: row.try_get("image_tag")?,
            build_log: row.try_get("build_log")?,
            error_message: row.try_get("error_message")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
        })
    }
}

#[async_trait]
impl BuildRepository for PostgresBuildRepository {
    async fn create(&self, build: &Build) -> PlatformResult<Build> {
        sqlx::query(
            r#"
            INSERT INTO builds (id, application_id, status, image_tag, build_log, error_message, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(build.id)
        .bind(build.application_id)
        .bind(build.status)
        .bind(&build.image_tag)
        .bind(&build.build_log)
        .bind(&build.error_message)
        .bind(build.started_at)
        .bind(build.finished_at)
        .execute(&self.pool)
        .await?;

        debug!("创建构建成功: {} (应用 {})", build.id, build.application_id);
        Ok(build.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> PlatformResult<Option<Build>> {
        let row = sqlx::query(&format!("SELECT {BUILD_COLUMNS} FROM builds WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_build).transpose()
    }

    async fn get_active_for_application(
        &self,
        application_id: Uuid,
    ) -> PlatformResult<Option<Build>> {
        let row = sqlx::query(&format!(
            "SELECT {BUILD_COLUMNS} FROM builds WHERE application_id = $1 AND status IN ('QUEUED', 'BUILDING') ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_build).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: BuildStatus,
        image_tag: Option<&str>,
        error_message: Option<&str>,
        finished_at: Option<DateTime<Utc>>,
    ) -> PlatformResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE builds
            SET status = $2,
                image_tag = COALESCE($3, image_tag),
                error_message = COALESCE($4, error_message),
                finished_at = COALESCE($5, finished_at)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(image_tag)
        .bind(error_message)
        .bind(finished_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PlatformError::BuildNotFound { id });
        }

        debug!("更新构建状态成功: {} -> {}", id, status);
        Ok(())
    }

    async fn append_log(&self, id: Uuid, chunk: &str) -> PlatformResult<()> {
        let result = sqlx::query("UPDATE builds SET build_log = build_log || $2 WHERE id = $1")
            .bind(id)
            .bind(chunk)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PlatformError::BuildNotFound { id });
        }

        Ok(())
    }
}
