use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use turnstile_core::{
    Error, UserId,
    repositories::VerificationCodeRepository,
    storage::{NewVerificationCode, VerificationCode},
};

use crate::database_error;

pub struct PostgresVerificationCodeRepository {
    pool: PgPool,
}

impl PostgresVerificationCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PostgresVerificationCode {
    id: i64,
    user_id: i64,
    email: String,
    code_hash: String,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<PostgresVerificationCode> for VerificationCode {
    fn from(row: PostgresVerificationCode) -> Self {
        VerificationCode {
            id: row.id,
            user_id: UserId::new(row.user_id),
            email: row.email,
            code_hash: row.code_hash,
            expires_at: row.expires_at,
            used_at: row.used_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl VerificationCodeRepository for PostgresVerificationCodeRepository {
    async fn create(&self, code: NewVerificationCode) -> Result<VerificationCode, Error> {
        let row = sqlx::query_as::<_, PostgresVerificationCode>(
            r#"
            INSERT INTO verification_codes (user_id, email, code_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, email, code_hash, expires_at, used_at, created_at
            "#,
        )
        .bind(code.user_id.as_i64())
        .bind(&code.email)
        .bind(&code.code_hash)
        .bind(code.expires_at)
        .bind(code.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(database_error("Failed to create verification code"))?;

        Ok(row.into())
    }

    async fn find_latest_unused(&self, email: &str) -> Result<Option<VerificationCode>, Error> {
        let row = sqlx::query_as::<_, PostgresVerificationCode>(
            r#"
            SELECT id, user_id, email, code_hash, expires_at, used_at, created_at
            FROM verification_codes
            WHERE email = $1 AND used_at IS NULL
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error("Failed to find verification code"))?;

        Ok(row.map(Into::into))
    }

    async fn mark_used(&self, id: i64, at: DateTime<Utc>) -> Result<bool, Error> {
        let result = sqlx::query(
            "UPDATE verification_codes SET used_at = $1 WHERE id = $2 AND used_at IS NULL",
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(database_error("Failed to consume verification code"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_failed_attempt(
        &self,
        id: i64,
        max_attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let consumed_at: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(
            r#"
            UPDATE verification_codes
            SET failed_attempts = failed_attempts + 1,
                used_at = CASE WHEN failed_attempts + 1 >= $2 THEN $3 ELSE used_at END
            WHERE id = $1 AND used_at IS NULL
            RETURNING used_at
            "#,
        )
        .bind(id)
        .bind(i64::from(max_attempts))
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error("Failed to record verification attempt"))?;

        Ok(matches!(consumed_at, Some(Some(_))))
    }

    async fn supersede_unused(&self, email: &str, at: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query(
            "UPDATE verification_codes SET used_at = $1 WHERE email = $2 AND used_at IS NULL",
        )
        .bind(at)
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(database_error("Failed to supersede verification codes"))?;

        Ok(result.rows_affected())
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM verification_codes WHERE expires_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(database_error("Failed to clean up verification codes"))?;

        Ok(result.rows_affected())
    }
}
