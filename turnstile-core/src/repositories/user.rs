use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Error, User, UserId, user::NewUser};

/// Credential store.
///
/// Callers pass emails already normalised with
/// [`normalize_email`](crate::validation::normalize_email); implementations must still enforce
/// case-insensitive uniqueness at the storage layer.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Create a new user.
    ///
    /// Fails with [`AuthError::DuplicateEmail`](crate::error::AuthError::DuplicateEmail) when the
    /// email is already taken, including when a concurrent registration wins the race.
    async fn create(&self, user: NewUser) -> Result<User, Error>;

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, Error>;

    /// Persist role, verification, lockout and ban state of `user`.
    async fn update(&self, user: &User) -> Result<User, Error>;

    async fn get_password_hash(&self, id: &UserId) -> Result<Option<String>, Error>;

    async fn mark_email_verified(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), Error>;

    /// Write both lockout fields in a single statement.
    async fn update_lockout(
        &self,
        id: &UserId,
        failed_login_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), Error>;
}
