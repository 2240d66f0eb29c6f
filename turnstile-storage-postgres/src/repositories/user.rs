use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use turnstile_core::{
    Error, Role, User, UserId,
    error::{AuthError, StorageError},
    repositories::UserRepository,
    user::NewUser,
    validation::normalize_email,
};

use crate::database_error;

pub(crate) const USER_COLUMNS: &str = "id, email, role, email_verified, email_verified_at, \
    failed_login_attempts, locked_until, is_banned, ban_reason, banned_at, created_at, updated_at";

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostgresUser {
    id: i64,
    email: String,
    role: String,
    email_verified: bool,
    email_verified_at: Option<DateTime<Utc>>,
    failed_login_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    is_banned: bool,
    ban_reason: Option<String>,
    banned_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PostgresUser> for User {
    type Error = StorageError;

    fn try_from(row: PostgresUser) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(|e| {
            tracing::error!(user_id = row.id, error = %e, "Unreadable role column");
            StorageError::Database("Invalid role".to_string())
        })?;

        Ok(User {
            id: UserId::new(row.id),
            email: row.email,
            role,
            email_verified: row.email_verified,
            email_verified_at: row.email_verified_at,
            failed_login_attempts: u32::try_from(row.failed_login_attempts).unwrap_or(0),
            locked_until: row.locked_until,
            is_banned: row.is_banned,
            ban_reason: row.ban_reason,
            banned_at: row.banned_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn write_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| {
        if e.as_database_error()
            .is_some_and(|d| d.is_unique_violation())
        {
            return AuthError::DuplicateEmail.into();
        }
        database_error(context)(e).into()
    }
}

fn attempts(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        let row = sqlx::query_as::<_, PostgresUser>(&format!(
            r#"
            INSERT INTO users (email, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(normalize_email(&user.email))
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(write_error("Failed to create user"))?;

        Ok(User::try_from(row)?)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, PostgresUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error("Failed to find user"))?;

        Ok(row.map(User::try_from).transpose()?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, PostgresUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error("Failed to find user"))?;

        Ok(row.map(User::try_from).transpose()?)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, Error> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))")
                .bind(email)
                .fetch_one(&self.pool)
                .await
                .map_err(database_error("Failed to check user existence"))?;

        Ok(exists)
    }

    async fn update(&self, user: &User) -> Result<User, Error> {
        let row = sqlx::query_as::<_, PostgresUser>(&format!(
            r#"
            UPDATE users
            SET email = $2, role = $3, email_verified = $4, email_verified_at = $5,
                failed_login_attempts = $6, locked_until = $7, is_banned = $8,
                ban_reason = $9, banned_at = $10, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id.as_i64())
        .bind(normalize_email(&user.email))
        .bind(user.role.as_str())
        .bind(user.email_verified)
        .bind(user.email_verified_at)
        .bind(attempts(user.failed_login_attempts))
        .bind(user.locked_until)
        .bind(user.is_banned)
        .bind(&user.ban_reason)
        .bind(user.banned_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error("Failed to update user"))?;

        row.map(User::try_from)
            .transpose()?
            .ok_or_else(|| StorageError::NotFound.into())
    }

    async fn get_password_hash(&self, id: &UserId) -> Result<Option<String>, Error> {
        let hash: Option<String> = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error("Failed to get password hash"))?;

        Ok(hash)
    }

    async fn mark_email_verified(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query(
            "UPDATE users SET email_verified = TRUE, email_verified_at = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(at)
        .bind(id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(database_error("Failed to mark email verified"))?;

        Ok(())
    }

    async fn update_lockout(
        &self,
        id: &UserId,
        failed_login_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        sqlx::query(
            "UPDATE users SET failed_login_attempts = $1, locked_until = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(attempts(failed_login_attempts))
        .bind(locked_until)
        .bind(id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(database_error("Failed to update lockout state"))?;

        Ok(())
    }
}
