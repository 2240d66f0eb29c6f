use std::sync::Arc;

use chrono::Utc;

use crate::{
    Error, User, UserId,
    error::AuthError,
    repositories::{RefreshTokenRepository, UserRepository},
    services::lockout::LockoutUpdate,
};

/// Administrative operations on accounts.
pub struct AccountService<U: UserRepository, T: RefreshTokenRepository> {
    user_repository: Arc<U>,
    token_repository: Arc<T>,
}

impl<U: UserRepository, T: RefreshTokenRepository> AccountService<U, T> {
    pub fn new(user_repository: Arc<U>, token_repository: Arc<T>) -> Self {
        Self {
            user_repository,
            token_repository,
        }
    }

    pub async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, Error> {
        self.user_repository.find_by_id(user_id).await
    }

    async fn require_user(&self, user_id: &UserId) -> Result<User, Error> {
        self.user_repository
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::UserNotFound.into())
    }

    /// Ban a user and revoke every refresh token they hold.
    ///
    /// Access tokens already handed out stay valid until they expire.
    pub async fn ban_user(&self, user_id: &UserId, reason: Option<String>) -> Result<User, Error> {
        let mut user = self.require_user(user_id).await?;
        let now = Utc::now();

        user.is_banned = true;
        user.ban_reason = reason;
        user.banned_at = Some(now);
        user.updated_at = now;
        let user = self.user_repository.update(&user).await?;

        let revoked = self
            .token_repository
            .revoke_all_for_user(user_id, now)
            .await?;

        tracing::warn!(user_id = %user_id, revoked, "User banned");
        Ok(user)
    }

    pub async fn unban_user(&self, user_id: &UserId) -> Result<User, Error> {
        let mut user = self.require_user(user_id).await?;

        user.is_banned = false;
        user.ban_reason = None;
        user.banned_at = None;
        user.updated_at = Utc::now();
        let user = self.user_repository.update(&user).await?;

        tracing::info!(user_id = %user_id, "User unbanned");
        Ok(user)
    }

    /// Clear the failure counter and any active lock.
    pub async fn unlock_account(&self, user_id: &UserId) -> Result<(), Error> {
        self.require_user(user_id).await?;
        let cleared = LockoutUpdate::cleared();
        self.user_repository
            .update_lockout(user_id, cleared.failed_login_attempts, cleared.locked_until)
            .await?;

        tracing::info!(user_id = %user_id, "Account unlocked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        services::test_support::{MockRefreshTokenRepository, MockUserRepository},
        storage::{ClientContext, NewRefreshToken},
        user::NewUser,
    };
    use chrono::Duration;

    async fn setup() -> (
        Arc<MockUserRepository>,
        Arc<MockRefreshTokenRepository>,
        AccountService<MockUserRepository, MockRefreshTokenRepository>,
        UserId,
    ) {
        let users = Arc::new(MockUserRepository::default());
        let tokens = Arc::new(MockRefreshTokenRepository::default());
        let user = users.create(NewUser::new("a@x.com", "hash")).await.unwrap();
        let service = AccountService::new(users.clone(), tokens.clone());
        (users, tokens, service, user.id)
    }

    #[tokio::test]
    async fn test_ban_revokes_refresh_tokens() {
        let (users, tokens, service, id) = setup().await;
        let now = Utc::now();
        for hash in ["h1", "h2"] {
            tokens
                .create(NewRefreshToken::root(
                    id,
                    hash.to_string(),
                    now,
                    now + Duration::days(1),
                    &ClientContext::default(),
                ))
                .await
                .unwrap();
        }

        let user = service
            .ban_user(&id, Some("chargeback".to_string()))
            .await
            .unwrap();
        assert!(user.is_banned());
        assert_eq!(users.get(id).ban_reason.as_deref(), Some("chargeback"));
        assert!(tokens.all().iter().all(|r| r.revoked_at.is_some()));

        let user = service.unban_user(&id).await.unwrap();
        assert!(!user.is_banned());
        assert!(user.banned_at.is_none());
    }

    #[tokio::test]
    async fn test_unlock_clears_lockout() {
        let (users, _, service, id) = setup().await;
        users
            .update_lockout(&id, 5, Some(Utc::now() + Duration::minutes(15)))
            .await
            .unwrap();

        service.unlock_account(&id).await.unwrap();
        let user = users.get(id);
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_missing_user() {
        let (_, _, service, _) = setup().await;
        let err = service.ban_user(&UserId::new(99), None).await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::UserNotFound)));
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
        assert!(service.get_user(&UserId::new(99)).await.unwrap().is_none());
    }
}
