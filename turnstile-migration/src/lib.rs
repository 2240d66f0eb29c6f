//! Versioned schema migrations shared by the turnstile storage backends.
//!
//! Each backend implements [`MigrationManager`] for its database and ships its own list of
//! [`Migration`]s. Every migration is applied inside its own transaction together with the
//! bookkeeping row, so a failed migration leaves neither a half-built schema nor a record
//! claiming it was applied.

use async_trait::async_trait;
use sqlx::Database;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[async_trait]
pub trait Migration<DB: Database>: Send + Sync {
    async fn up<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    async fn down<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Unique, strictly increasing version number
    fn version(&self) -> i64;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    /// Unix seconds; the one timestamp encoding every backend agrees on.
    pub applied_at: i64,
}

#[async_trait]
pub trait MigrationManager<DB: Database>: Send + Sync {
    fn get_migration_table_name(&self) -> &str {
        "_turnstile_migrations"
    }

    /// Create the bookkeeping table if it does not exist yet
    async fn initialize(&self) -> Result<()>;

    /// Apply every migration that has not been applied yet, in order
    async fn up(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    /// Roll back every applied migration, newest first
    async fn down(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    async fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>>;

    async fn is_applied(&self, version: i64) -> Result<bool>;
}

/// Reject migration lists whose versions are not strictly increasing.
///
/// Managers call this before touching the database so a mis-ordered list fails fast instead of
/// applying half of itself.
pub fn validate_order<DB: Database>(migrations: &[Box<dyn Migration<DB>>]) -> Result<()> {
    for pair in migrations.windows(2) {
        if pair[1].version() <= pair[0].version() {
            return Err(MigrationError::Migration(format!(
                "Migration {} (v{}) must have a higher version than {} (v{})",
                pair[1].name(),
                pair[1].version(),
                pair[0].name(),
                pair[0].version()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Sqlite;

    struct Noop(i64);

    #[async_trait]
    impl Migration<Sqlite> for Noop {
        async fn up<'a>(&'a self, _conn: &'a mut <Sqlite as Database>::Connection) -> Result<()> {
            Ok(())
        }

        async fn down<'a>(
            &'a self,
            _conn: &'a mut <Sqlite as Database>::Connection,
        ) -> Result<()> {
            Ok(())
        }

        fn version(&self) -> i64 {
            self.0
        }

        fn name(&self) -> &str {
            "Noop"
        }
    }

    fn list(versions: &[i64]) -> Vec<Box<dyn Migration<Sqlite>>> {
        versions
            .iter()
            .map(|v| Box::new(Noop(*v)) as Box<dyn Migration<Sqlite>>)
            .collect()
    }

    #[test]
    fn test_validate_order() {
        assert!(validate_order(&list(&[])).is_ok());
        assert!(validate_order(&list(&[1, 2, 5])).is_ok());
        assert!(validate_order(&list(&[1, 1])).is_err());
        assert!(validate_order(&list(&[2, 1])).is_err());
    }
}
