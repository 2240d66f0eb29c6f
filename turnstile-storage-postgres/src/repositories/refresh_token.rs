use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use turnstile_core::{
    Error, User, UserId,
    error::StorageError,
    repositories::{RefreshTokenRepository, RefreshTokenTransaction},
    storage::{FamilyId, NewRefreshToken, RefreshTokenRecord},
};

use super::user::{PostgresUser, USER_COLUMNS};
use crate::database_error;

const TOKEN_COLUMNS: &str = "id, user_id, token_hash, family_id, rotated_from, issued_at, \
    expires_at, used_at, revoked_at, reuse_detected_at, user_agent, ip_address";

#[derive(Debug, sqlx::FromRow)]
struct PostgresRefreshToken {
    id: i64,
    user_id: i64,
    token_hash: String,
    family_id: String,
    rotated_from: Option<i64>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    reuse_detected_at: Option<DateTime<Utc>>,
    user_agent: Option<String>,
    ip_address: Option<String>,
}

impl From<PostgresRefreshToken> for RefreshTokenRecord {
    fn from(row: PostgresRefreshToken) -> Self {
        RefreshTokenRecord {
            id: row.id,
            user_id: UserId::new(row.user_id),
            token_hash: row.token_hash,
            family_id: FamilyId::new(row.family_id),
            rotated_from: row.rotated_from,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            used_at: row.used_at,
            revoked_at: row.revoked_at,
            reuse_detected_at: row.reuse_detected_at,
            user_agent: row.user_agent,
            ip_address: row.ip_address,
        }
    }
}

async fn insert(conn: &mut PgConnection, token: &NewRefreshToken) -> Result<RefreshTokenRecord, Error> {
    let row = sqlx::query_as::<_, PostgresRefreshToken>(&format!(
        r#"
        INSERT INTO refresh_tokens
            (user_id, token_hash, family_id, rotated_from, issued_at, expires_at, user_agent, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {TOKEN_COLUMNS}
        "#
    ))
    .bind(token.user_id.as_i64())
    .bind(&token.token_hash)
    .bind(token.family_id.as_str())
    .bind(token.rotated_from)
    .bind(token.issued_at)
    .bind(token.expires_at)
    .bind(&token.user_agent)
    .bind(&token.ip_address)
    .fetch_one(conn)
    .await
    .map_err(database_error("Failed to create refresh token"))?;

    Ok(row.into())
}

pub struct PostgresRefreshTokenRepository {
    pool: PgPool,
}

impl PostgresRefreshTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Rotation transaction holding `FOR UPDATE` locks until commit or drop.
pub struct PostgresRefreshTokenTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RefreshTokenTransaction for PostgresRefreshTokenTransaction {
    async fn lock_by_hash(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, Error> {
        let row = sqlx::query_as::<_, PostgresRefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE token_hash = $1 FOR UPDATE"
        ))
        .bind(token_hash)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(database_error("Failed to lock refresh token"))?;

        Ok(row.map(Into::into))
    }

    async fn find_owner(&mut self, user_id: &UserId) -> Result<Option<User>, Error> {
        // FOR SHARE makes a concurrent ban's UPDATE wait for this transaction, so the ban's
        // follow-up revocation sees any successor written here.
        let row = sqlx::query_as::<_, PostgresUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR SHARE"
        ))
        .bind(user_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(database_error("Failed to find refresh token owner"))?;

        Ok(row.map(User::try_from).transpose()?)
    }

    async fn mark_reuse_detected(&mut self, id: i64, at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query("UPDATE refresh_tokens SET reuse_detected_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(database_error("Failed to mark refresh token reuse"))?;
        Ok(())
    }

    async fn revoke_family(
        &mut self,
        family_id: &FamilyId,
        at: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $1 WHERE family_id = $2 AND revoked_at IS NULL",
        )
        .bind(at)
        .bind(family_id.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(database_error("Failed to revoke refresh token family"))?;
        Ok(result.rows_affected())
    }

    async fn rotate(
        &mut self,
        current_id: i64,
        successor: NewRefreshToken,
        at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, Error> {
        let consumed = sqlx::query(
            r#"
            UPDATE refresh_tokens SET used_at = $1, revoked_at = $1
            WHERE id = $2 AND used_at IS NULL AND revoked_at IS NULL
            "#,
        )
        .bind(at)
        .bind(current_id)
        .execute(&mut *self.tx)
        .await
        .map_err(database_error("Failed to consume refresh token"))?;

        if consumed.rows_affected() != 1 {
            return Err(StorageError::Constraint("Refresh token already consumed".to_string()).into());
        }

        insert(&mut self.tx, &successor).await
    }

    async fn commit(self) -> Result<(), Error> {
        self.tx
            .commit()
            .await
            .map_err(database_error("Failed to commit refresh token transaction"))?;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenRepository for PostgresRefreshTokenRepository {
    type Transaction = PostgresRefreshTokenTransaction;

    async fn begin(&self) -> Result<Self::Transaction, Error> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(database_error("Failed to begin refresh token transaction"))?;
        Ok(PostgresRefreshTokenTransaction { tx })
    }

    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, Error> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(database_error("Failed to acquire connection"))?;
        insert(&mut conn, &token).await
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, Error> {
        let row = sqlx::query_as::<_, PostgresRefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error("Failed to find refresh token"))?;

        Ok(row.map(Into::into))
    }

    async fn revoke_by_hash(&self, token_hash: &str, at: DateTime<Utc>) -> Result<bool, Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $1 WHERE token_hash = $2 AND revoked_at IS NULL",
        )
        .bind(at)
        .bind(token_hash)
        .execute(&self.pool)
        .await
        .map_err(database_error("Failed to revoke refresh token"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $1 WHERE user_id = $2 AND revoked_at IS NULL",
        )
        .bind(at)
        .bind(user_id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(database_error("Failed to revoke user refresh tokens"))?;
        Ok(result.rows_affected())
    }

    async fn list_family(&self, family_id: &FamilyId) -> Result<Vec<RefreshTokenRecord>, Error> {
        let rows = sqlx::query_as::<_, PostgresRefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE family_id = $1 ORDER BY id"
        ))
        .bind(family_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(database_error("Failed to list refresh token family"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn prune_for_user(
        &self,
        user_id: &UserId,
        keep: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = $1
              AND family_id IN (
                  SELECT family_id FROM refresh_tokens
                  WHERE user_id = $1
                  GROUP BY family_id
                  HAVING COUNT(*) FILTER (
                      WHERE used_at IS NULL AND revoked_at IS NULL AND expires_at > $3
                  ) = 0
                  ORDER BY MAX(id) DESC
                  OFFSET $2
              )
            "#,
        )
        .bind(user_id.as_i64())
        .bind(i64::from(keep))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(database_error("Failed to prune refresh tokens"))?;
        Ok(result.rows_affected())
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(database_error("Failed to clean up expired refresh tokens"))?;
        Ok(result.rows_affected())
    }
}
