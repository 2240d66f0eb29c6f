//! SQLite storage backend for turnstile.
//!
//! Timestamps are stored as INTEGER unix seconds. Refresh token rotation takes SQLite's write
//! lock with its first statement, which gives the same serialization a row lock does on
//! databases that have them.
//!
//! ```rust,no_run
//! use sqlx::SqlitePool;
//! use turnstile_core::RepositoryProvider;
//! use turnstile_storage_sqlite::SqliteRepositoryProvider;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = SqlitePool::connect("sqlite://turnstile.db?mode=rwc").await?;
//! let provider = SqliteRepositoryProvider::new(pool);
//! provider.migrate().await?;
//! # Ok(())
//! # }
//! ```

mod migrations;
pub mod repositories;

use chrono::{DateTime, Utc};
use turnstile_core::error::StorageError;

pub use migrations::SqliteMigrationManager;
pub use repositories::{
    SqliteRefreshTokenRepository, SqliteRefreshTokenTransaction, SqliteRepositoryProvider,
    SqliteUserRepository, SqliteVerificationCodeRepository,
};

pub(crate) fn from_unix(seconds: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
        tracing::error!(seconds, "Timestamp out of range");
        StorageError::Database("Invalid timestamp".to_string())
    })
}

pub(crate) fn from_unix_opt(seconds: Option<i64>) -> Result<Option<DateTime<Utc>>, StorageError> {
    seconds.map(from_unix).transpose()
}

/// Build an in-memory database with the schema applied.
///
/// The pool holds a single connection: every `sqlite::memory:` connection is its own database.
#[cfg(test)]
pub(crate) async fn test_provider() -> SqliteRepositoryProvider {
    use sqlx::sqlite::SqlitePoolOptions;
    use turnstile_core::RepositoryProvider;

    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let provider = SqliteRepositoryProvider::new(pool);
    provider.migrate().await.unwrap();
    provider
}
