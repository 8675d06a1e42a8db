use async_trait::async_trait;
use platform_core::{
    errors::PlatformResult,
    models::EnvironmentVariable,
    traits::EnvVarRepository,
};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// PostgreSQL环境变量仓储实现，值始终以密文存取
pub struct PostgresEnvVarRepository {
    pool: PgPool,
}

impl PostgresEnvVarRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnvVarRepository for PostgresEnvVarRepository {
    async fn upsert(&self, var: &EnvironmentVariable) -> PlatformResult<()> {
        sqlx::query(
            r#"
            INSERT INTO environment_variables (id, application_id, key, encrypted_value)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (application_id, key) DO UPDATE SET
                encrypted_value = EXCLUDED.encrypted_value
            "#,
        )
        .bind(var.id)
        .bind(var.application_id)
        .bind(&var.key)
        .bind(&var.encrypted_value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_application(
        &self,
        application_id: Uuid,
    ) -> PlatformResult<Vec<EnvironmentVariable>> {
        let rows = sqlx::query(
            "SELECT id, application_id, key, encrypted_value FROM environment_variables WHERE application_id = $1 ORDER BY key"
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(EnvironmentVariable {
                    id: row.try_get("id")?,
                    application_id: row.try_get("application_id")?,
                    key: row.try_get("key")?,
                    encrypted_value: row.try_get("encrypted_value")?,
                })
            })
            .collect()
    }

    async fn delete(&self, application_id: Uuid, key: &str) -> PlatformResult<()> {
        sqlx::query("DELETE FROM environment_variables WHERE application_id = $1 AND key = $2")
            .bind(application_id)
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
