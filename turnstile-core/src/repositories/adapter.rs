use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error, User, UserId,
    repositories::{
        RefreshTokenRepository, RepositoryProvider, UserRepository, VerificationCodeRepository,
    },
    storage::{
        FamilyId, NewRefreshToken, NewVerificationCode, RefreshTokenRecord, VerificationCode,
    },
    user::NewUser,
};

/// Adapter that wraps a RepositoryProvider and implements individual repository traits
pub struct UserRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> UserRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> UserRepository for UserRepositoryAdapter<R> {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        self.provider.user().create(user).await
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        self.provider.user().find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        self.provider.user().find_by_email(email).await
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, Error> {
        self.provider.user().exists_by_email(email).await
    }

    async fn update(&self, user: &User) -> Result<User, Error> {
        self.provider.user().update(user).await
    }

    async fn get_password_hash(&self, id: &UserId) -> Result<Option<String>, Error> {
        self.provider.user().get_password_hash(id).await
    }

    async fn mark_email_verified(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), Error> {
        self.provider.user().mark_email_verified(id, at).await
    }

    async fn update_lockout(
        &self,
        id: &UserId,
        failed_login_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        self.provider
            .user()
            .update_lockout(id, failed_login_attempts, locked_until)
            .await
    }
}

pub struct RefreshTokenRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> RefreshTokenRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> RefreshTokenRepository for RefreshTokenRepositoryAdapter<R> {
    type Transaction = <R::RefreshTokenRepo as RefreshTokenRepository>::Transaction;

    async fn begin(&self) -> Result<Self::Transaction, Error> {
        self.provider.refresh_token().begin().await
    }

    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, Error> {
        self.provider.refresh_token().create(token).await
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, Error> {
        self.provider.refresh_token().find_by_hash(token_hash).await
    }

    async fn revoke_by_hash(&self, token_hash: &str, at: DateTime<Utc>) -> Result<bool, Error> {
        self.provider
            .refresh_token()
            .revoke_by_hash(token_hash, at)
            .await
    }

    async fn revoke_all_for_user(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, Error> {
        self.provider
            .refresh_token()
            .revoke_all_for_user(user_id, at)
            .await
    }

    async fn list_family(&self, family_id: &FamilyId) -> Result<Vec<RefreshTokenRecord>, Error> {
        self.provider.refresh_token().list_family(family_id).await
    }

    async fn prune_for_user(
        &self,
        user_id: &UserId,
        keep: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        self.provider
            .refresh_token()
            .prune_for_user(user_id, keep, now)
            .await
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.refresh_token().cleanup_expired(before).await
    }
}

pub struct VerificationCodeRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> VerificationCodeRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> VerificationCodeRepository for VerificationCodeRepositoryAdapter<R> {
    async fn create(&self, code: NewVerificationCode) -> Result<VerificationCode, Error> {
        self.provider.verification_code().create(code).await
    }

    async fn find_latest_unused(&self, email: &str) -> Result<Option<VerificationCode>, Error> {
        self.provider
            .verification_code()
            .find_latest_unused(email)
            .await
    }

    async fn mark_used(&self, id: i64, at: DateTime<Utc>) -> Result<bool, Error> {
        self.provider.verification_code().mark_used(id, at).await
    }

    async fn record_failed_attempt(
        &self,
        id: i64,
        max_attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.provider
            .verification_code()
            .record_failed_attempt(id, max_attempts, at)
            .await
    }

    async fn supersede_unused(&self, email: &str, at: DateTime<Utc>) -> Result<u64, Error> {
        self.provider
            .verification_code()
            .supersede_unused(email, at)
            .await
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.verification_code().cleanup_expired(before).await
    }
}
