use async_trait::async_trait;
use platform_core::{
    errors::PlatformResult,
    models::{AppDomain, SslStatus},
    traits::DomainRepository,
};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL域名仓储实现
pub struct PostgresDomainRepository {
    pool: PgPool,
}

impl PostgresDomainRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_domain(row: &sqlx::postgres::PgRow) -> PlatformResult<AppDomain> {
        Ok(AppDomain {
            id: row.try_get("id")?,
            application_id: row.try_get("application_id")?,
            hostname: row.try_get("hostname")?,
            verification_token: row.try_get("verification_token")?,
            verification: row.try_get("verification")?,
            ssl_status: row.try_get("ssl_status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl DomainRepository for PostgresDomainRepository {
    async fn create(&self, domain: &AppDomain) -> PlatformResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_domains (id, application_id, hostname, verification_token, verification, ssl_status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(domain.id)
        .bind(domain.application_id)
        .bind(&domain.hostname)
        .bind(&domain.verification_token)
        .bind(domain.verification)
        .bind(domain.ssl_status)
        .bind(domain.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_application(&self, application_id: Uuid) -> PlatformResult<Vec<AppDomain>> {
        let rows = sqlx::query(
            "SELECT id, application_id, hostname, verification_token, verification, ssl_status, created_at FROM app_domains WHERE application_id = $1 ORDER BY hostname"
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_domain).collect()
    }

    async fn mark_verified(&self, id: Uuid) -> PlatformResult<()> {
        sqlx::query("UPDATE app_domains SET verification = 'VERIFIED' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!("域名DNS验证通过: {}", id);
        Ok(())
    }

    async fn update_ssl_status(&self, id: Uuid, status: SslStatus) -> PlatformResult<()> {
        sqlx::query("UPDATE app_domains SET ssl_status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_ssl_active_by_hostnames(
        &self,
        application_id: Uuid,
        hostnames: &[String],
    ) -> PlatformResult<u64> {
        // 仅已通过DNS验证的域名允许激活
        let result = sqlx::query(
            r#"
            UPDATE app_domains
            SET ssl_status = 'ACTIVE'
            WHERE application_id = $1
              AND hostname = ANY($2)
              AND verification = 'VERIFIED'
            "#,
        )
        .bind(application_id)
        .bind(hostnames)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
