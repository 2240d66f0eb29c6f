use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    storage::{NewVerificationCode, VerificationCode},
};

/// Storage for email verification codes.
#[async_trait]
pub trait VerificationCodeRepository: Send + Sync + 'static {
    async fn create(&self, code: NewVerificationCode) -> Result<VerificationCode, Error>;

    /// Newest code for `email` whose `used_at` is still unset, expired or not.
    async fn find_latest_unused(&self, email: &str) -> Result<Option<VerificationCode>, Error>;

    /// Consume a code. Returns `false` if it was already used, so two concurrent confirmations
    /// cannot both succeed.
    async fn mark_used(&self, id: i64, at: DateTime<Utc>) -> Result<bool, Error>;

    /// Count a wrong guess against an unused code, consuming it at `at` once `max_attempts`
    /// wrong guesses have been made. Returns whether this guess used the code up.
    async fn record_failed_attempt(
        &self,
        id: i64,
        max_attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, Error>;

    /// Mark every unused code for `email` as used. Returns the number of codes retired.
    async fn supersede_unused(&self, email: &str, at: DateTime<Utc>) -> Result<u64, Error>;

    /// Delete codes that expired before `before`.
    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
