use async_trait::async_trait;
use platform_core::{
    errors::PlatformResult,
    models::{BackupRecord, ManagedDatabase},
    traits::ManagedDatabaseRepository,
};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL托管数据库仓储实现
pub struct PostgresManagedDatabaseRepository {
    pool: PgPool,
}

impl PostgresManagedDatabaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ManagedDatabaseRepository for PostgresManagedDatabaseRepository {
    async fn get_by_id(&self, id: Uuid) -> PlatformResult<Option<ManagedDatabase>> {
        let row = sqlx::query(
            "SELECT id, organization_id, name, engine, region, node_id, status, created_at FROM managed_databases WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(ManagedDatabase {
                id: row.try_get("id")?,
                organization_id: row.try_get("organization_id")?,
                name: row.try_get("name")?,
                engine: row.try_get("engine")?,
                region: row.try_get("region")?,
                node_id: row.try_get("node_id")?,
                status: row.try_get("status")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn record_backup(&self, record: &BackupRecord) -> PlatformResult<()> {
        sqlx::query(
            r#"
            INSERT INTO backup_records (id, database_id, path, size_bytes, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id)
        .bind(record.database_id)
        .bind(&record.path)
        .bind(record.size_bytes)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        debug!("记录备份成功: 数据库 {} -> {}", record.database_id, record.path);
        Ok(())
    }

    async fn list_backups(&self, database_id: Uuid) -> PlatformResult<Vec<BackupRecord>> {
        let rows = sqlx::query(
            "SELECT id, database_id, path, size_bytes, created_at FROM backup_records WHERE database_id = $1 ORDER BY created_at DESC"
        )
        .bind(database_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(BackupRecord {
                    id: row.try_get("id")?,
                    database_id: row.try_get("database_id")?,
                    path: row.try_get("path")?,
                    size_bytes: row.try_get("size_bytes")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
