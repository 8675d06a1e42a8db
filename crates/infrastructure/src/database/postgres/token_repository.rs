use async_trait::async_trait;
use chrono::{DateTime, Utc};
use platform_core::{
    errors::PlatformResult,
    models::RegistrationToken,
    traits::RegistrationTokenRepository,
};
use sqlx::{PgPool, Row};
use tracing::debug;

/// PostgreSQL注册令牌仓储实现
pub struct PostgresTokenRepository {
    pool: PgPool,
}

impl PostgresTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationTokenRepository for PostgresTokenRepository {
    async fn create(&self, token: &RegistrationToken) -> PlatformResult<()> {
        sqlx::query(
            r#"
            INSERT INTO registration_tokens (token, region, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.token)
        .bind(&token.region)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        debug!("签发注册令牌: 区域 {}", token.region);
        Ok(())
    }

    async fn consume(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> PlatformResult<Option<RegistrationToken>> {
        // DELETE RETURNING保证单次使用：并发消费只有一个请求拿到行
        let row = sqlx::query(
            r#"
            DELETE FROM registration_tokens
            WHERE token = $1 AND expires_at > $2
            RETURNING token, region, created_at, expires_at
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(RegistrationToken {
                token: row.try_get("token")?,
                region: row.try_get("region")?,
                created_at: row.try_get("created_at")?,
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }
}
