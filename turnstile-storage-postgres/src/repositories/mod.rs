//! Repository implementations for Postgres storage

pub mod refresh_token;
pub mod user;
pub mod verification;

pub use refresh_token::{PostgresRefreshTokenRepository, PostgresRefreshTokenTransaction};
pub use user::PostgresUserRepository;
pub use verification::PostgresVerificationCodeRepository;

use async_trait::async_trait;
use sqlx::PgPool;
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

use crate::migrations::{self, PostgresMigrationManager};

/// Repository provider implementation for Postgres
pub struct PostgresRepositoryProvider {
    pool: PgPool,
    user: Arc<PostgresUserRepository>,
    refresh_token: Arc<PostgresRefreshTokenRepository>,
    verification_code: Arc<PostgresVerificationCodeRepository>,
}

impl PostgresRepositoryProvider {
    pub fn new(pool: PgPool) -> Self {
        let user = Arc::new(PostgresUserRepository::new(pool.clone()));
        let refresh_token = Arc::new(PostgresRefreshTokenRepository::new(pool.clone()));
        let verification_code = Arc::new(PostgresVerificationCodeRepository::new(pool.clone()));

        Self {
            pool,
            user,
            refresh_token,
            verification_code,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl UserRepositoryProvider for PostgresRepositoryProvider {
    type UserRepo = PostgresUserRepository;

    fn user(&self) -> &Self::UserRepo {
        &self.user
    }
}

impl RefreshTokenRepositoryProvider for PostgresRepositoryProvider {
    type RefreshTokenRepo = PostgresRefreshTokenRepository;

    fn refresh_token(&self) -> &Self::RefreshTokenRepo {
        &self.refresh_token
    }
}

impl VerificationCodeRepositoryProvider for PostgresRepositoryProvider {
    type VerificationCodeRepo = PostgresVerificationCodeRepository;

    fn verification_code(&self) -> &Self::VerificationCodeRepo {
        &self.verification_code
    }
}

#[async_trait]
impl RepositoryProvider for PostgresRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let manager = PostgresMigrationManager::new(self.pool.clone());
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
