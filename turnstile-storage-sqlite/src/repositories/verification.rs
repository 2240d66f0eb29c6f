use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use turnstile_core::{
    Error, UserId,
    error::StorageError,
    repositories::VerificationCodeRepository,
    storage::{NewVerificationCode, VerificationCode},
};

use crate::{from_unix, from_unix_opt};

pub struct SqliteVerificationCodeRepository {
    pool: SqlitePool,
}

impl SqliteVerificationCodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteVerificationCode {
    id: i64,
    user_id: i64,
    email: String,
    code_hash: String,
    expires_at: i64,
    used_at: Option<i64>,
    created_at: i64,
}

impl TryFrom<SqliteVerificationCode> for VerificationCode {
    type Error = StorageError;

    fn try_from(row: SqliteVerificationCode) -> Result<Self, Self::Error> {
        Ok(VerificationCode {
            id: row.id,
            user_id: UserId::new(row.user_id),
            email: row.email,
            code_hash: row.code_hash,
            expires_at: from_unix(row.expires_at)?,
            used_at: from_unix_opt(row.used_at)?,
            created_at: from_unix(row.created_at)?,
        })
    }
}

#[async_trait]
impl VerificationCodeRepository for SqliteVerificationCodeRepository {
    async fn create(&self, code: NewVerificationCode) -> Result<VerificationCode, Error> {
        let row = sqlx::query_as::<_, SqliteVerificationCode>(
            r#"
            INSERT INTO verification_codes (user_id, email, code_hash, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id, user_id, email, code_hash, expires_at, used_at, created_at
            "#,
        )
        .bind(code.user_id.as_i64())
        .bind(&code.email)
        .bind(&code.code_hash)
        .bind(code.expires_at.timestamp())
        .bind(code.created_at.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create verification code");
            StorageError::Database("Failed to create verification code".to_string())
        })?;

        Ok(VerificationCode::try_from(row)?)
    }

    async fn find_latest_unused(&self, email: &str) -> Result<Option<VerificationCode>, Error> {
        let row = sqlx::query_as::<_, SqliteVerificationCode>(
            r#"
            SELECT id, user_id, email, code_hash, expires_at, used_at, created_at
            FROM verification_codes
            WHERE email = ?1 AND used_at IS NULL
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to find verification code");
            StorageError::Database("Failed to find verification code".to_string())
        })?;

        Ok(row.map(VerificationCode::try_from).transpose()?)
    }

    async fn mark_used(&self, id: i64, at: DateTime<Utc>) -> Result<bool, Error> {
        let result = sqlx::query(
            "UPDATE verification_codes SET used_at = ?1 WHERE id = ?2 AND used_at IS NULL",
        )
        .bind(at.timestamp())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to consume verification code");
            StorageError::Database("Failed to consume verification code".to_string())
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_failed_attempt(
        &self,
        id: i64,
        max_attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let consumed_at: Option<Option<i64>> = sqlx::query_scalar(
            r#"
            UPDATE verification_codes
            SET failed_attempts = failed_attempts + 1,
                used_at = CASE WHEN failed_attempts + 1 >= ?2 THEN ?3 ELSE used_at END
            WHERE id = ?1 AND used_at IS NULL
            RETURNING used_at
            "#,
        )
        .bind(id)
        .bind(i64::from(max_attempts))
        .bind(at.timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to record verification attempt");
            StorageError::Database("Failed to record verification attempt".to_string())
        })?;

        Ok(matches!(consumed_at, Some(Some(_))))
    }

    async fn supersede_unused(&self, email: &str, at: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query(
            "UPDATE verification_codes SET used_at = ?1 WHERE email = ?2 AND used_at IS NULL",
        )
        .bind(at.timestamp())
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to supersede verification codes");
            StorageError::Database("Failed to supersede verification codes".to_string())
        })?;

        Ok(result.rows_affected())
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM verification_codes WHERE expires_at < ?1")
            .bind(before.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to clean up verification codes");
                StorageError::Database("Failed to clean up verification codes".to_string())
            })?;

        Ok(result.rows_affected())
    }
}
