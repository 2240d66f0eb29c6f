//! Postgres storage backend for turnstile.
//!
//! Refresh token rotation locks the presented row with `SELECT ... FOR UPDATE`, so concurrent
//! exchanges of the same token serialize on that row while unrelated tokens proceed in
//! parallel. Integration tests for this crate live in the `turnstile` crate and run against a
//! throwaway container.

mod migrations;
pub mod repositories;

use turnstile_core::error::StorageError;

pub use migrations::PostgresMigrationManager;
pub use repositories::{
    PostgresRefreshTokenRepository, PostgresRefreshTokenTransaction, PostgresRepositoryProvider,
    PostgresUserRepository, PostgresVerificationCodeRepository,
};

pub(crate) fn database_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> StorageError {
    move |e| {
        tracing::error!(error = %e, "{context}");
        StorageError::Database(context.to_string())
    }
}
