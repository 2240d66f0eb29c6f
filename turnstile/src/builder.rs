//! Type-state builder for [`Turnstile`].
//!
//! Storage has to be chosen before `build` is available, so a missing backend is a compile
//! error rather than a runtime one.
//!
//! ```rust,no_run
//! use turnstile::{AuthConfig, JwtConfig, LockoutConfig, Pepper, TurnstileBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::new(Pepper::new(vec![7u8; 32])?)
//!     .with_lockout(LockoutConfig::default().with_max_failed_attempts(3));
//!
//! let turnstile = TurnstileBuilder::new(config, JwtConfig::new_hs256(b"secret".to_vec()))
//!     .with_sqlite("sqlite::memory:")
//!     .await?
//!     .apply_migrations(true)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use turnstile_core::{AuthConfig, JwtConfig, RepositoryProvider};

use crate::Turnstile;

/// Errors that can occur when building a [`Turnstile`] instance.
#[derive(Debug, thiserror::Error)]
pub enum TurnstileBuilderError {
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    /// Bad signing keys or hashing parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Initial state of [`TurnstileBuilder`]: no storage yet.
pub struct NoStorage;

/// Storage has been configured.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

pub struct TurnstileBuilder<Storage> {
    storage: Storage,
    config: AuthConfig,
    jwt: JwtConfig,
    apply_migrations: bool,
}

impl TurnstileBuilder<NoStorage> {
    /// Start a builder. Migrations are not applied unless asked for.
    pub fn new(config: AuthConfig, jwt: JwtConfig) -> Self {
        Self {
            storage: NoStorage,
            config,
            jwt,
            apply_migrations: false,
        }
    }

    /// Use an already constructed storage backend.
    pub fn with_repositories<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> TurnstileBuilder<WithStorage<R>> {
        TurnstileBuilder {
            storage: WithStorage { repositories },
            config: self.config,
            jwt: self.jwt,
            apply_migrations: self.apply_migrations,
        }
    }
}

#[cfg(feature = "sqlite")]
impl TurnstileBuilder<NoStorage> {
    /// Connect to SQLite at `url`, e.g. `sqlite://turnstile.db?mode=rwc`.
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<TurnstileBuilder<WithStorage<crate::SqliteRepositoryProvider>>, TurnstileBuilderError>
    {
        let pool = sqlx::SqlitePool::connect(url)
            .await
            .map_err(|e| TurnstileBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_sqlite_pool(pool))
    }

    /// Share an existing SQLite pool.
    pub fn with_sqlite_pool(
        self,
        pool: sqlx::SqlitePool,
    ) -> TurnstileBuilder<WithStorage<crate::SqliteRepositoryProvider>> {
        self.with_repositories(Arc::new(crate::SqliteRepositoryProvider::new(pool)))
    }
}

#[cfg(feature = "postgres")]
impl TurnstileBuilder<NoStorage> {
    /// Connect to PostgreSQL at `url`.
    pub async fn with_postgres(
        self,
        url: &str,
    ) -> Result<
        TurnstileBuilder<WithStorage<crate::PostgresRepositoryProvider>>,
        TurnstileBuilderError,
    > {
        let pool = sqlx::PgPool::connect(url)
            .await
            .map_err(|e| TurnstileBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_postgres_pool(pool))
    }

    pub fn with_postgres_pool(
        self,
        pool: sqlx::PgPool,
    ) -> TurnstileBuilder<WithStorage<crate::PostgresRepositoryProvider>> {
        self.with_repositories(Arc::new(crate::PostgresRepositoryProvider::new(pool)))
    }
}

impl<R: RepositoryProvider> TurnstileBuilder<WithStorage<R>> {
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }

    pub async fn build(self) -> Result<Turnstile<R>, TurnstileBuilderError> {
        if self.apply_migrations {
            self.storage
                .repositories
                .migrate()
                .await
                .map_err(|e| TurnstileBuilderError::Migration(e.to_string()))?;
        }

        Turnstile::new(self.storage.repositories, self.jwt, self.config)
            .map_err(|e| TurnstileBuilderError::InvalidConfiguration(e.to_string()))
    }
}
