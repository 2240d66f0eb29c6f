//! Repository implementations for SQLite storage

pub mod refresh_token;
pub mod user;
pub mod verification;

pub use refresh_token::{SqliteRefreshTokenRepository, SqliteRefreshTokenTransaction};
pub use user::SqliteUserRepository;
pub use verification::SqliteVerificationCodeRepository;

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use turnstile_core::{
    Error,
    error::StorageError,
    repositories::{
        RefreshTokenRepositoryProvider, RepositoryProvider, UserRepositoryProvider,
        VerificationCodeRepositoryProvider,
    },
};
use turnstile_migration::MigrationManager;

use crate::migrations::{self, SqliteMigrationManager};

/// Repository provider implementation for SQLite
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    user: Arc<SqliteUserRepository>,
    refresh_token: Arc<SqliteRefreshTokenRepository>,
    verification_code: Arc<SqliteVerificationCodeRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let user = Arc::new(SqliteUserRepository::new(pool.clone()));
        let refresh_token = Arc::new(SqliteRefreshTokenRepository::new(pool.clone()));
        let verification_code = Arc::new(SqliteVerificationCodeRepository::new(pool.clone()));

        Self {
            pool,
            user,
            refresh_token,
            verification_code,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl UserRepositoryProvider for SqliteRepositoryProvider {
    type UserRepo = SqliteUserRepository;

    fn user(&self) -> &Self::UserRepo {
        &self.user
    }
}

impl RefreshTokenRepositoryProvider for SqliteRepositoryProvider {
    type RefreshTokenRepo = SqliteRefreshTokenRepository;

    fn refresh_token(&self) -> &Self::RefreshTokenRepo {
        &self.refresh_token
    }
}

impl VerificationCodeRepositoryProvider for SqliteRepositoryProvider {
    type VerificationCodeRepo = SqliteVerificationCodeRepository;

    fn verification_code(&self) -> &Self::VerificationCodeRepo {
        &self.verification_code
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            StorageError::Migration("Failed to initialize migrations".to_string())
        })?;

        manager.up(&migrations::all()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            StorageError::Migration("Failed to run migrations".to_string())
        })?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Health check failed");
                StorageError::Connection("Database unreachable".to_string())
            })?;
        Ok(())
    }
}
