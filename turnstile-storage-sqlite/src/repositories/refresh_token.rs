//! Refresh tokens on SQLite.
//!
//! SQLite has no row locks. A transaction opened with a plain `BEGIN` only takes the database
//! write lock on its first write, so [`SqliteRefreshTokenTransaction::lock_by_hash`] starts with
//! a no-op `UPDATE ... RETURNING`: the write lock is acquired before the row is read, and a
//! second rotation of the same token waits until the first commits or rolls back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use turnstile_core::{
    Error, User, UserId,
    error::StorageError,
    repositories::{RefreshTokenRepository, RefreshTokenTransaction},
    storage::{FamilyId, NewRefreshToken, RefreshTokenRecord},
};

use super::user::{SqliteUser, USER_COLUMNS};
use crate::{from_unix, from_unix_opt};

const TOKEN_COLUMNS: &str = "id, user_id, token_hash, family_id, rotated_from, issued_at, \
    expires_at, used_at, revoked_at, reuse_detected_at, user_agent, ip_address";

#[derive(Debug, sqlx::FromRow)]
struct SqliteRefreshToken {
    id: i64,
    user_id: i64,
    token_hash: String,
    family_id: String,
    rotated_from: Option<i64>,
    issued_at: i64,
    expires_at: i64,
    used_at: Option<i64>,
    revoked_at: Option<i64>,
    reuse_detected_at: Option<i64>,
    user_agent: Option<String>,
    ip_address: Option<String>,
}

impl TryFrom<SqliteRefreshToken> for RefreshTokenRecord {
    type Error = StorageError;

    fn try_from(row: SqliteRefreshToken) -> Result<Self, Self::Error> {
        Ok(RefreshTokenRecord {
            id: row.id,
            user_id: UserId::new(row.user_id),
            token_hash: row.token_hash,
            family_id: FamilyId::new(row.family_id),
            rotated_from: row.rotated_from,
            issued_at: from_unix(row.issued_at)?,
            expires_at: from_unix(row.expires_at)?,
            used_at: from_unix_opt(row.used_at)?,
            revoked_at: from_unix_opt(row.revoked_at)?,
            reuse_detected_at: from_unix_opt(row.reuse_detected_at)?,
            user_agent: row.user_agent,
            ip_address: row.ip_address,
        })
    }
}

fn database_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> StorageError {
    move |e| {
        tracing::error!(error = %e, "{context}");
        StorageError::Database(context.to_string())
    }
}

async fn insert(
    conn: &mut SqliteConnection,
    token: &NewRefreshToken,
) -> Result<RefreshTokenRecord, Error> {
    let row = sqlx::query_as::<_, SqliteRefreshToken>(&format!(
        r#"
        INSERT INTO refresh_tokens
            (user_id, token_hash, family_id, rotated_from, issued_at, expires_at, user_agent, ip_address)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        RETURNING {TOKEN_COLUMNS}
        "#
    ))
    .bind(token.user_id.as_i64())
    .bind(&token.token_hash)
    .bind(token.family_id.as_str())
    .bind(token.rotated_from)
    .bind(token.issued_at.timestamp())
    .bind(token.expires_at.timestamp())
    .bind(&token.user_agent)
    .bind(&token.ip_address)
    .fetch_one(conn)
    .await
    .map_err(database_error("Failed to create refresh token"))?;

    Ok(RefreshTokenRecord::try_from(row)?)
}

pub struct SqliteRefreshTokenRepository {
    pool: SqlitePool,
}

impl SqliteRefreshTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Rotation transaction. Dropping it without [`commit`](RefreshTokenTransaction::commit) rolls
/// back.
pub struct SqliteRefreshTokenTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl RefreshTokenTransaction for SqliteRefreshTokenTransaction {
    async fn lock_by_hash(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, Error> {
        let row = sqlx::query_as::<_, SqliteRefreshToken>(&format!(
            "UPDATE refresh_tokens SET id = id WHERE token_hash = ?1 RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(token_hash)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(database_error("Failed to lock refresh token"))?;

        Ok(row.map(RefreshTokenRecord::try_from).transpose()?)
    }

    async fn find_owner(&mut self, user_id: &UserId) -> Result<Option<User>, Error> {
        // The write lock taken by lock_by_hash already keeps a ban from interleaving.
        let row = sqlx::query_as::<_, SqliteUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
        ))
        .bind(user_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(database_error("Failed to find refresh token owner"))?;

        Ok(row.map(User::try_from).transpose()?)
    }

    async fn mark_reuse_detected(&mut self, id: i64, at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query("UPDATE refresh_tokens SET reuse_detected_at = ?1 WHERE id = ?2")
            .bind(at.timestamp())
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
            "UPDATE refresh_tokens SET revoked_at = ?1 WHERE family_id = ?2 AND revoked_at IS NULL",
        )
        .bind(at.timestamp())
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
            UPDATE refresh_tokens SET used_at = ?1, revoked_at = ?1
            WHERE id = ?2 AND used_at IS NULL AND revoked_at IS NULL
            "#,
        )
        .bind(at.timestamp())
        .bind(current_id)
        .execute(&mut *self.tx)
        .await
        .map_err(database_error("Failed to consume refresh token"))?;

        if consumed.rows_affected() != 1 {
            return Err(StorageError::Constraint("Refresh token already consumed".to_string()).into());
        }

        insert(&mut *self.tx, &successor).await
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
impl RefreshTokenRepository for SqliteRefreshTokenRepository {
    type Transaction = SqliteRefreshTokenTransaction;

    async fn begin(&self) -> Result<Self::Transaction, Error> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(database_error("Failed to begin refresh token transaction"))?;
        Ok(SqliteRefreshTokenTransaction { tx })
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
        let row = sqlx::query_as::<_, SqliteRefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE token_hash = ?1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error("Failed to find refresh token"))?;

        Ok(row.map(RefreshTokenRecord::try_from).transpose()?)
    }

    async fn revoke_by_hash(&self, token_hash: &str, at: DateTime<Utc>) -> Result<bool, Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ?1 WHERE token_hash = ?2 AND revoked_at IS NULL",
        )
        .bind(at.timestamp())
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
            "UPDATE refresh_tokens SET revoked_at = ?1 WHERE user_id = ?2 AND revoked_at IS NULL",
        )
        .bind(at.timestamp())
        .bind(user_id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(database_error("Failed to revoke user refresh tokens"))?;
        Ok(result.rows_affected())
    }

    async fn list_family(&self, family_id: &FamilyId) -> Result<Vec<RefreshTokenRecord>, Error> {
        let rows = sqlx::query_as::<_, SqliteRefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE family_id = ?1 ORDER BY id"
        ))
        .bind(family_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(database_error("Failed to list refresh token family"))?;

        Ok(rows
            .into_iter()
            .map(RefreshTokenRecord::try_from)
            .collect::<Result<_, _>>()?)
    }

    async fn prune_for_user(
        &self,
        user_id: &UserId,
        keep: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        // LIMIT -1 is SQLite for "no limit", required before OFFSET
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = ?1
              AND family_id IN (
                  SELECT family_id FROM refresh_tokens
                  WHERE user_id = ?1
                  GROUP BY family_id
                  HAVING SUM(used_at IS NULL AND revoked_at IS NULL AND expires_at > ?3) = 0
                  ORDER BY MAX(id) DESC
                  LIMIT -1 OFFSET ?2
              )
            "#,
        )
        .bind(user_id.as_i64())
        .bind(i64::from(keep))
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(database_error("Failed to prune refresh tokens"))?;
        Ok(result.rows_affected())
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?1")
            .bind(before.timestamp())
            .execute(&self.pool)
            .await
            .map_err(database_error("Failed to clean up expired refresh tokens"))?;
        Ok(result.rows_affected())
    }
}
