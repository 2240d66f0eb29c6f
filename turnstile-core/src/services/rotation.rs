//! Refresh token rotation with reuse detection.
//!
//! Every exchange runs in one storage transaction that row-locks the presented record. A
//! record that was already exchanged or revoked while other members of its family are still
//! live is treated as stolen: the whole family is revoked and the caller gets
//! [`TokenError::RefreshTokenReused`]. Once a family is fully revoked, any of its records is
//! just an invalid token, though the presentation is still recorded on the record.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    Error, UserId,
    config::RefreshTokenConfig,
    crypto::{TokenHasher, generate_secure_token},
    error::{AuthError, TokenError},
    repositories::{RefreshTokenRepository, RefreshTokenTransaction},
    signer::AccessTokenSigner,
    storage::{ClientContext, NewRefreshToken},
};

/// A freshly minted access and refresh token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub user_id: UserId,
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

pub struct RefreshRotator<T, S>
where
    T: RefreshTokenRepository,
    S: AccessTokenSigner,
{
    token_repository: Arc<T>,
    signer: Arc<S>,
    token_hasher: TokenHasher,
    config: RefreshTokenConfig,
}

impl<T, S> RefreshRotator<T, S>
where
    T: RefreshTokenRepository,
    S: AccessTokenSigner,
{
    pub fn new(
        token_repository: Arc<T>,
        signer: Arc<S>,
        token_hasher: TokenHasher,
        config: RefreshTokenConfig,
    ) -> Self {
        Self {
            token_repository,
            signer,
            token_hasher,
            config,
        }
    }

    /// Exchange `refresh_token` for a new pair.
    ///
    /// The successor inherits the family and points back at the record it replaced. The owner is
    /// read inside the same transaction, after the record is locked. Nothing is written unless
    /// the whole exchange succeeds, except when a spent record is presented or the owner is gone
    /// or banned. Those paths commit what they recorded before returning the error.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        context: ClientContext,
    ) -> Result<TokenPair, Error> {
        let token_hash = self.token_hasher.hash_refresh_token(refresh_token);
        let now = Utc::now();

        let mut tx = self.token_repository.begin().await?;

        let Some(current) = tx.lock_by_hash(&token_hash).await? else {
            return Err(TokenError::InvalidRefreshToken.into());
        };

        if current.is_expired_at(now) {
            return Err(TokenError::InvalidRefreshToken.into());
        }

        if current.is_spent() {
            let revoked = tx.revoke_family(&current.family_id, now).await?;
            tx.mark_reuse_detected(current.id, now).await?;
            tx.commit().await?;

            if revoked == 0 {
                // Nothing left alive in this family; there is no chain to protect.
                tracing::warn!(
                    user_id = %current.user_id,
                    family_id = %current.family_id,
                    token_id = current.id,
                    "Refresh token from a dead family presented"
                );
                return Err(TokenError::InvalidRefreshToken.into());
            }

            tracing::error!(
                user_id = %current.user_id,
                family_id = %current.family_id,
                token_id = current.id,
                revoked,
                "Refresh token reuse detected, family revoked"
            );
            return Err(TokenError::RefreshTokenReused.into());
        }

        let user = match tx.find_owner(&current.user_id).await? {
            Some(user) if user.is_banned() => {
                tx.revoke_family(&current.family_id, now).await?;
                tx.commit().await?;
                tracing::warn!(user_id = %user.id, "Refresh attempted by banned user");
                return Err(AuthError::AccountBanned.into());
            }
            Some(user) => user,
            None => {
                tx.revoke_family(&current.family_id, now).await?;
                tx.commit().await?;
                return Err(TokenError::InvalidRefreshToken.into());
            }
        };

        if !user.is_email_verified() {
            return Err(AuthError::EmailNotVerified.into());
        }

        // Signing can fail; do it before anything is written.
        let access_token = self.signer.issue(user.id, user.role)?;

        let new_refresh_token = generate_secure_token();
        let refresh_expires_at = now + self.config.ttl;
        let successor = tx
            .rotate(
                current.id,
                NewRefreshToken::successor(
                    &current,
                    self.token_hasher.hash_refresh_token(&new_refresh_token),
                    now,
                    refresh_expires_at,
                    &context,
                ),
                now,
            )
            .await?;
        tx.commit().await?;

        tracing::info!(
            user_id = %user.id,
            family_id = %successor.family_id,
            rotated_from = current.id,
            "Refresh token rotated"
        );

        Ok(TokenPair {
            user_id: user.id,
            access_token,
            refresh_token: new_refresh_token,
            refresh_expires_at,
        })
    }
}
