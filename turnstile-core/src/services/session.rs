//! Login and logout.
//!
//! [`SessionIssuer::login`] walks a fixed sequence of checks, any of which ends the call:
//!
//! 1. look the user up by normalised email (a miss is reported as invalid credentials)
//! 2. ban check
//! 3. lockout check, before the password hash is ever read
//! 4. email verification check
//! 5. password comparison, feeding failures back into the lockout counters
//! 6. clear lockout state, sign an access token, start a new refresh token family

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    Error, User, UserId,
    config::RefreshTokenConfig,
    crypto::{TokenHasher, generate_secure_token},
    error::AuthError,
    password::{PasswordHasher, verify_password},
    repositories::{RefreshTokenRepository, UserRepository},
    services::lockout::LockoutPolicy,
    signer::AccessTokenSigner,
    storage::{ClientContext, NewRefreshToken},
    validation::normalize_email,
};

/// Result of a successful login.
///
/// `refresh_token` is the raw secret. It is returned exactly once; only its digest is stored.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

pub struct SessionIssuer<U, T, H, S>
where
    U: UserRepository,
    T: RefreshTokenRepository,
    H: PasswordHasher,
    S: AccessTokenSigner,
{
    user_repository: Arc<U>,
    token_repository: Arc<T>,
    password_hasher: Arc<H>,
    signer: Arc<S>,
    token_hasher: TokenHasher,
    lockout: LockoutPolicy,
    config: RefreshTokenConfig,
}

impl<U, T, H, S> SessionIssuer<U, T, H, S>
where
    U: UserRepository,
    T: RefreshTokenRepository,
    H: PasswordHasher,
    S: AccessTokenSigner,
{
    pub fn new(
        user_repository: Arc<U>,
        token_repository: Arc<T>,
        password_hasher: Arc<H>,
        signer: Arc<S>,
        token_hasher: TokenHasher,
        lockout: LockoutPolicy,
        config: RefreshTokenConfig,
    ) -> Self {
        Self {
            user_repository,
            token_repository,
            password_hasher,
            signer,
            token_hasher,
            lockout,
            config,
        }
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        context: ClientContext,
    ) -> Result<LoginOutcome, Error> {
        let email = normalize_email(email);
        let now = Utc::now();

        let Some(mut user) = self.user_repository.find_by_email(&email).await? else {
            tracing::debug!("Login attempt for unknown email");
            return Err(AuthError::InvalidCredentials.into());
        };

        if user.is_banned() {
            tracing::warn!(user_id = %user.id, "Login attempt on banned account");
            return Err(AuthError::AccountBanned.into());
        }

        let status = self.lockout.status(&user, now);
        if let Some(locked_until) = status.locked_until.filter(|_| status.is_locked) {
            tracing::warn!(user_id = %user.id, %locked_until, "Login attempt on locked account");
            return Err(AuthError::AccountLocked { locked_until }.into());
        }

        if !user.is_email_verified() {
            return Err(AuthError::EmailNotVerified.into());
        }

        let password_hash = self
            .user_repository
            .get_password_hash(&user.id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&self.password_hasher, &password_hash, password).await? {
            return Err(self.record_failure(&user, now).await?);
        }

        if let Some(update) = self.lockout.on_success(&user) {
            self.user_repository
                .update_lockout(&user.id, update.failed_login_attempts, update.locked_until)
                .await?;
            user.failed_login_attempts = update.failed_login_attempts;
            user.locked_until = update.locked_until;
        }

        let access_token = self.signer.issue(user.id, user.role)?;

        let refresh_token = generate_secure_token();
        let refresh_expires_at = now + self.config.ttl;
        let record = self
            .token_repository
            .create(NewRefreshToken::root(
                user.id,
                self.token_hasher.hash_refresh_token(&refresh_token),
                now,
                refresh_expires_at,
                &context,
            ))
            .await?;

        match self
            .token_repository
            .prune_for_user(&user.id, self.config.retention_cap, now)
            .await
        {
            Ok(0) => {}
            Ok(pruned) => tracing::debug!(user_id = %user.id, pruned, "Pruned old refresh tokens"),
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Failed to prune refresh tokens")
            }
        }

        tracing::info!(
            user_id = %user.id,
            family_id = %record.family_id,
            "User logged in"
        );

        Ok(LoginOutcome {
            user,
            access_token,
            refresh_token,
            refresh_expires_at,
        })
    }

    /// Persist one more failure and pick the error to report for it.
    async fn record_failure(&self, user: &User, now: DateTime<Utc>) -> Result<Error, Error> {
        let Some(update) = self.lockout.on_failure(user, now) else {
            return Ok(AuthError::InvalidCredentials.into());
        };

        self.user_repository
            .update_lockout(&user.id, update.failed_login_attempts, update.locked_until)
            .await?;

        match update.locked_until.filter(|_| update.is_locked_at(now)) {
            Some(locked_until) => {
                tracing::warn!(
                    user_id = %user.id,
                    attempts = update.failed_login_attempts,
                    %locked_until,
                    "Account locked after repeated failed logins"
                );
                Ok(AuthError::AccountLocked { locked_until }.into())
            }
            None => {
                tracing::warn!(
                    user_id = %user.id,
                    attempts = update.failed_login_attempts,
                    "Failed login"
                );
                Ok(AuthError::InvalidCredentials.into())
            }
        }
    }

    /// Revoke one refresh token. Unknown or already revoked tokens are not an error.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), Error> {
        let token_hash = self.token_hasher.hash_refresh_token(refresh_token);
        if self
            .token_repository
            .revoke_by_hash(&token_hash, Utc::now())
            .await?
        {
            tracing::info!("Refresh token revoked on logout");
        }
        Ok(())
    }

    /// Revoke every refresh token the user holds, across all families.
    pub async fn logout_all(&self, user_id: &UserId) -> Result<u64, Error> {
        let revoked = self
            .token_repository
            .revoke_all_for_user(user_id, Utc::now())
            .await?;
        tracing::info!(user_id = %user_id, revoked, "All refresh tokens revoked");
        Ok(revoked)
    }
}
