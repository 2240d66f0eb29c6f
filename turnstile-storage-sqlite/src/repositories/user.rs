use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use turnstile_core::{
    Error, Role, User, UserId,
    error::{AuthError, StorageError},
    repositories::UserRepository,
    user::NewUser,
    validation::normalize_email,
};

use crate::{from_unix, from_unix_opt};

pub(crate) const USER_COLUMNS: &str = "id, email, role, email_verified, email_verified_at, \
    failed_login_attempts, locked_until, is_banned, ban_reason, banned_at, created_at, updated_at";

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SqliteUser {
    id: i64,
    email: String,
    role: String,
    email_verified: bool,
    email_verified_at: Option<i64>,
    failed_login_attempts: i64,
    locked_until: Option<i64>,
    is_banned: bool,
    ban_reason: Option<String>,
    banned_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SqliteUser> for User {
    type Error = StorageError;

    fn try_from(row: SqliteUser) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(|e| {
            tracing::error!(user_id = row.id, error = %e, "Unreadable role column");
            StorageError::Database("Invalid role".to_string())
        })?;

        Ok(User {
            id: UserId::new(row.id),
            email: row.email,
            role,
            email_verified: row.email_verified,
            email_verified_at: from_unix_opt(row.email_verified_at)?,
            failed_login_attempts: u32::try_from(row.failed_login_attempts).unwrap_or(u32::MAX),
            locked_until: from_unix_opt(row.locked_until)?,
            is_banned: row.is_banned,
            ban_reason: row.ban_reason,
            banned_at: from_unix_opt(row.banned_at)?,
            created_at: from_unix(row.created_at)?,
            updated_at: from_unix(row.updated_at)?,
        })
    }
}

fn into_user(row: Option<SqliteUser>) -> Result<Option<User>, Error> {
    Ok(row.map(User::try_from).transpose()?)
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        let now = Utc::now().timestamp();

        let row = sqlx::query_as::<_, SqliteUser>(&format!(
            r#"
            INSERT INTO users (email, password_hash, role, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(normalize_email(&user.email))
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|d| d.is_unique_violation())
            {
                return Error::from(AuthError::DuplicateEmail);
            }
            tracing::error!(error = %e, "Failed to create user");
            StorageError::Database("Failed to create user".to_string()).into()
        })?;

        Ok(User::try_from(row)?)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, SqliteUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to find user by id");
            StorageError::Database("Failed to find user".to_string())
        })?;

        into_user(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, SqliteUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to find user by email");
            StorageError::Database("Failed to find user".to_string())
        })?;

        into_user(row)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, Error> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to check user existence");
                StorageError::Database("Failed to check user existence".to_string())
            })?;

        Ok(exists)
    }

    async fn update(&self, user: &User) -> Result<User, Error> {
        let row = sqlx::query_as::<_, SqliteUser>(&format!(
            r#"
            UPDATE users
            SET email = ?2, role = ?3, email_verified = ?4, email_verified_at = ?5,
                failed_login_attempts = ?6, locked_until = ?7, is_banned = ?8,
                ban_reason = ?9, banned_at = ?10, updated_at = ?11
            WHERE id = ?1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id.as_i64())
        .bind(normalize_email(&user.email))
        .bind(user.role.as_str())
        .bind(user.email_verified)
        .bind(user.email_verified_at.map(|t| t.timestamp()))
        .bind(i64::from(user.failed_login_attempts))
        .bind(user.locked_until.map(|t| t.timestamp()))
        .bind(user.is_banned)
        .bind(&user.ban_reason)
        .bind(user.banned_at.map(|t| t.timestamp()))
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|d| d.is_unique_violation())
            {
                return Error::from(AuthError::DuplicateEmail);
            }
            tracing::error!(error = %e, "Failed to update user");
            StorageError::Database("Failed to update user".to_string()).into()
        })?;

        into_user(row)?.ok_or_else(|| StorageError::NotFound.into())
    }

    async fn get_password_hash(&self, id: &UserId) -> Result<Option<String>, Error> {
        let hash: Option<String> = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to get password hash");
                StorageError::Database("Failed to get password hash".to_string())
            })?;

        Ok(hash)
    }

    async fn mark_email_verified(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query(
            "UPDATE users SET email_verified = 1, email_verified_at = ?1, updated_at = ?1 WHERE id = ?2",
        )
        .bind(at.timestamp())
        .bind(id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to mark email verified");
            StorageError::Database("Failed to mark email verified".to_string())
        })?;

        Ok(())
    }

    async fn update_lockout(
        &self,
        id: &UserId,
        failed_login_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        sqlx::query(
            "UPDATE users SET failed_login_attempts = ?1, locked_until = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(i64::from(failed_login_attempts))
        .bind(locked_until.map(|t| t.timestamp()))
        .bind(Utc::now().timestamp())
        .bind(id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to update lockout state");
            StorageError::Database("Failed to update lockout state".to_string())
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_provider;
    use chrono::{Duration, Utc};
    use turnstile_core::{
        ErrorKind, Role,
        repositories::{UserRepository, UserRepositoryProvider},
        user::NewUser,
    };

    #[tokio::test]
    async fn test_create_and_find() {
        let provider = test_provider().await;
        let repo = provider.user();

        let user = repo
            .create(NewUser::new("Alice@Example.com", "hash").with_role(Role::StudioOwner))
            .await
            .unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, Role::StudioOwner);
        assert!(!user.is_email_verified());

        let found = repo.find_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(found, user);
        assert!(repo.exists_by_email("alice@example.com").await.unwrap());
        assert_eq!(
            repo.get_password_hash(&user.id).await.unwrap().as_deref(),
            Some("hash")
        );
        assert!(repo.find_by_email("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_case_insensitive() {
        let provider = test_provider().await;
        let repo = provider.user();
        repo.create(NewUser::new("a@x.com", "hash")).await.unwrap();

        let err = repo.create(NewUser::new("A@X.COM", "hash")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateEmail);
    }

    #[tokio::test]
    async fn test_lockout_and_verification_columns() {
        let provider = test_provider().await;
        let repo = provider.user();
        let user = repo.create(NewUser::new("a@x.com", "hash")).await.unwrap();
        let until = Utc::now() + Duration::minutes(15);

        repo.update_lockout(&user.id, 5, Some(until)).await.unwrap();
        repo.mark_email_verified(&user.id, Utc::now()).await.unwrap();

        let stored = repo.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 5);
        assert_eq!(stored.locked_until.unwrap().timestamp(), until.timestamp());
        assert!(stored.email_verified);
        assert!(stored.is_email_verified());
    }

    #[tokio::test]
    async fn test_update_ban_state() {
        let provider = test_provider().await;
        let repo = provider.user();
        let mut user = repo.create(NewUser::new("a@x.com", "hash")).await.unwrap();

        user.is_banned = true;
        user.ban_reason = Some("fraud".to_string());
        user.banned_at = Some(Utc::now());
        let updated = repo.update(&user).await.unwrap();
        assert!(updated.is_banned());
        assert_eq!(updated.ban_reason.as_deref(), Some("fraud"));
    }
}
