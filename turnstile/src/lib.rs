//! # Turnstile
//!
//! Turnstile is the credential and session core of a web backend. It owns the users table,
//! decides who may log in, and hands out short-lived access tokens paired with long-lived,
//! rotating refresh tokens.
//!
//! What you get:
//! - Argon2id password storage
//! - Account lockout after repeated failures
//! - Email verification with single-use codes
//! - Refresh token rotation with reuse detection
//! - Logout of one session or every session of a user
//!
//! ## Storage Support
//!
//! - SQLite (`sqlite` feature, on by default)
//! - Postgres (`postgres` feature)
//!
//! ## Example
//!
//! ```rust,no_run
//! use turnstile::{AuthConfig, ClientContext, JwtConfig, Pepper, TurnstileBuilder};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::new(Pepper::new(std::env::var("TURNSTILE_PEPPER")?)?);
//! let jwt = JwtConfig::new_hs256(std::env::var("TURNSTILE_JWT_SECRET")?.into_bytes());
//!
//! let turnstile = TurnstileBuilder::new(config, jwt)
//!     .with_sqlite("sqlite://turnstile.db?mode=rwc")
//!     .await?
//!     .apply_migrations(true)
//!     .build()
//!     .await?;
//!
//! let login = turnstile
//!     .login("user@example.com", "correct horse battery", ClientContext::default())
//!     .await?;
//! let pair = turnstile
//!     .refresh(&login.refresh_token, ClientContext::default())
//!     .await?;
//! turnstile.logout(&pair.refresh_token).await?;
//! # Ok(())
//! # }
//! ```

mod builder;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use turnstile_core::{
    repositories::{
        RefreshTokenRepository, RefreshTokenRepositoryAdapter, UserRepositoryAdapter,
        VerificationCodeRepositoryAdapter,
    },
    services::{
        AccountService, EmailVerificationService, LockoutPolicy, RefreshRotator,
        RegistrationService, SessionIssuer,
    },
};

pub use builder::{NoStorage, TurnstileBuilder, TurnstileBuilderError, WithStorage};

/// Re-export core types from turnstile_core
pub use turnstile_core::{
    AccessClaims, AccessTokenSigner, Argon2Hasher, AuthConfig, ClientContext, Error, ErrorKind,
    FamilyId, JwtConfig, JwtSigner, NewUser, PasswordHasher, RefreshTokenRecord,
    RepositoryProvider, Role, TracingMailer, User, UserId, VerificationMailer,
    config::{
        LockoutConfig, MailerFailurePolicy, PasswordHashConfig, Pepper, RefreshTokenConfig,
        VerificationConfig,
    },
    services::{LoginOutcome, TokenPair},
};

/// Re-export storage backends
#[cfg(feature = "sqlite")]
pub use turnstile_storage_sqlite::SqliteRepositoryProvider;

#[cfg(feature = "postgres")]
pub use turnstile_storage_postgres::PostgresRepositoryProvider;

type Users<R> = UserRepositoryAdapter<R>;
type RefreshTokens<R> = RefreshTokenRepositoryAdapter<R>;
type VerificationCodes<R> = VerificationCodeRepositoryAdapter<R>;

/// Rows removed by [`Turnstile::purge_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub verification_codes: u64,
    pub refresh_tokens: u64,
}

/// The main entry point.
///
/// Holds one storage backend and every service built on top of it. Cloning is cheap; all
/// state lives behind `Arc`.
///
/// # Type Parameters
///
/// * `R` - storage backend
/// * `S` - access token signer
/// * `H` - password hasher
/// * `M` - delivery of verification codes
pub struct Turnstile<R, S = JwtSigner, H = Argon2Hasher, M = TracingMailer>
where
    R: RepositoryProvider,
    S: AccessTokenSigner,
    H: PasswordHasher,
    M: VerificationMailer,
{
    repositories: Arc<R>,
    signer: Arc<S>,
    hasher: Arc<H>,
    config: AuthConfig,
    refresh_tokens: Arc<RefreshTokens<R>>,
    registration: Arc<RegistrationService<Users<R>, H>>,
    verification: Arc<EmailVerificationService<Users<R>, VerificationCodes<R>, M>>,
    sessions: Arc<SessionIssuer<Users<R>, RefreshTokens<R>, H, S>>,
    rotator: Arc<RefreshRotator<RefreshTokens<R>, S>>,
    accounts: Arc<AccountService<Users<R>, RefreshTokens<R>>>,
}

impl<R, S, H, M> Clone for Turnstile<R, S, H, M>
where
    R: RepositoryProvider,
    S: AccessTokenSigner,
    H: PasswordHasher,
    M: VerificationMailer,
{
    fn clone(&self) -> Self {
        Self {
            repositories: self.repositories.clone(),
            signer: self.signer.clone(),
            hasher: self.hasher.clone(),
            config: self.config.clone(),
            refresh_tokens: self.refresh_tokens.clone(),
            registration: self.registration.clone(),
            verification: self.verification.clone(),
            sessions: self.sessions.clone(),
            rotator: self.rotator.clone(),
            accounts: self.accounts.clone(),
        }
    }
}

impl<R: RepositoryProvider> Turnstile<R> {
    /// Create a new instance with the bundled JWT signer, Argon2id hasher and tracing mailer.
    ///
    /// # Arguments
    ///
    /// * `repositories` - storage backend
    /// * `jwt` - signing configuration for access tokens
    /// * `config` - everything else
    ///
    /// # Errors
    ///
    /// Fails when the JWT keys or the Argon2 cost parameters are invalid.
    pub fn new(repositories: Arc<R>, jwt: JwtConfig, config: AuthConfig) -> Result<Self, Error> {
        let signer = JwtSigner::new(jwt)?;
        let hasher = Argon2Hasher::new(&config.password_hash)?;
        Ok(Self::with_components(
            repositories,
            signer,
            hasher,
            TracingMailer,
            config,
        ))
    }
}

impl<R, S, H, M> Turnstile<R, S, H, M>
where
    R: RepositoryProvider,
    S: AccessTokenSigner,
    H: PasswordHasher,
    M: VerificationMailer,
{
    /// Create an instance from explicitly chosen components.
    pub fn with_components(
        repositories: Arc<R>,
        signer: S,
        hasher: H,
        mailer: M,
        config: AuthConfig,
    ) -> Self {
        Self::assemble(
            repositories,
            Arc::new(signer),
            Arc::new(hasher),
            Arc::new(mailer),
            config,
        )
    }

    fn assemble(
        repositories: Arc<R>,
        signer: Arc<S>,
        hasher: Arc<H>,
        mailer: Arc<M>,
        config: AuthConfig,
    ) -> Self {
        let users = Arc::new(UserRepositoryAdapter::new(repositories.clone()));
        let refresh_tokens = Arc::new(RefreshTokenRepositoryAdapter::new(repositories.clone()));
        let codes = Arc::new(VerificationCodeRepositoryAdapter::new(repositories.clone()));
        let token_hasher = turnstile_core::crypto::TokenHasher::new(config.pepper.clone());

        let registration = Arc::new(RegistrationService::new(users.clone(), hasher.clone()));
        let lockout = LockoutPolicy::new(config.lockout.clone());
        let verification = Arc::new(EmailVerificationService::new(
            users.clone(),
            codes,
            mailer,
            token_hasher.clone(),
            config.verification.clone(),
        ));
        let sessions = Arc::new(SessionIssuer::new(
            users.clone(),
            refresh_tokens.clone(),
            hasher.clone(),
            signer.clone(),
            token_hasher.clone(),
            lockout,
            config.refresh_token.clone(),
        ));
        let rotator = Arc::new(RefreshRotator::new(
            refresh_tokens.clone(),
            signer.clone(),
            token_hasher,
            config.refresh_token.clone(),
        ));
        let accounts = Arc::new(AccountService::new(users, refresh_tokens.clone()));

        Self {
            repositories,
            signer,
            hasher,
            config,
            refresh_tokens,
            registration,
            verification,
            sessions,
            rotator,
            accounts,
        }
    }

    /// Swap the verification mailer, keeping everything else.
    pub fn with_mailer<M2: VerificationMailer>(self, mailer: M2) -> Turnstile<R, S, H, M2> {
        Turnstile::assemble(
            self.repositories,
            self.signer,
            self.hasher,
            Arc::new(mailer),
            self.config,
        )
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Run the storage backend's migrations.
    pub async fn migrate(&self) -> Result<(), Error> {
        self.repositories.migrate().await
    }

    /// Check that the storage backend is reachable.
    pub async fn health_check(&self) -> Result<(), Error> {
        self.repositories.health_check().await
    }

    /// Register a new account with the default role.
    ///
    /// # Arguments
    ///
    /// * `email` - normalised before it is stored
    /// * `password` - plaintext, hashed with Argon2id
    ///
    /// # Returns
    ///
    /// The created user, unverified. When codes are sent on registration the first one is
    /// mailed here; a delivery failure is logged and does not undo the registration.
    pub async fn register(&self, email: &str, password: &str) -> Result<User, Error> {
        self.register_with_role(email, password, Role::default())
            .await
    }

    /// Register a new account with an explicit role.
    pub async fn register_with_role(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, Error> {
        let user = self.registration.register(email, password, role).await?;

        if self.verification.config().send_on_registration {
            if let Err(e) = self.verification.issue_for(&user).await {
                tracing::warn!(
                    user_id = %user.id,
                    error = %e,
                    "Failed to issue verification code after registration"
                );
            }
        }

        Ok(user)
    }

    /// Mail a fresh verification code to `email`.
    ///
    /// Succeeds for unknown and already verified addresses without sending anything.
    ///
    /// # Returns
    ///
    /// The time the request was processed.
    pub async fn request_verification_code(&self, email: &str) -> Result<DateTime<Utc>, Error> {
        self.verification.request_code(email).await
    }

    /// Consume a verification code and mark the address verified.
    pub async fn confirm_email(&self, email: &str, code: &str) -> Result<User, Error> {
        self.verification.confirm(email, code).await
    }

    /// Log in with email and password.
    ///
    /// # Arguments
    ///
    /// * `context` - user agent and IP recorded on the refresh token
    ///
    /// # Returns
    ///
    /// An access token and the first refresh token of a new family.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        context: ClientContext,
    ) -> Result<LoginOutcome, Error> {
        self.sessions.login(email, password, context).await
    }

    /// Exchange a refresh token for a new access and refresh token pair.
    ///
    /// Presenting a token that was already exchanged revokes its whole family and fails with
    /// [`ErrorKind::RefreshTokenReused`].
    pub async fn refresh(
        &self,
        refresh_token: &str,
        context: ClientContext,
    ) -> Result<TokenPair, Error> {
        self.rotator.refresh(refresh_token, context).await
    }

    /// Revoke one refresh token. Unknown and already revoked tokens succeed silently.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), Error> {
        self.sessions.logout(refresh_token).await
    }

    /// Revoke every refresh token of a user.
    ///
    /// # Returns
    ///
    /// The number of tokens revoked.
    pub async fn logout_all(&self, user_id: &UserId) -> Result<u64, Error> {
        self.sessions.logout_all(user_id).await
    }

    /// Validate an access token and return the identity it carries.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, Error> {
        self.signer.verify(token)
    }

    pub async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, Error> {
        self.accounts.get_user(user_id).await
    }

    /// Ban a user and revoke all of their refresh tokens.
    pub async fn ban_user(&self, user_id: &UserId, reason: Option<String>) -> Result<User, Error> {
        self.accounts.ban_user(user_id, reason).await
    }

    pub async fn unban_user(&self, user_id: &UserId) -> Result<User, Error> {
        self.accounts.unban_user(user_id).await
    }

    /// Clear a lockout before it runs out.
    pub async fn unlock_account(&self, user_id: &UserId) -> Result<(), Error> {
        self.accounts.unlock_account(user_id).await
    }

    /// Delete verification codes and refresh tokens that expired before `now`.
    ///
    /// Meant to be called from a periodic job.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport, Error> {
        let verification_codes = self.verification.purge_expired(now).await?;
        let refresh_tokens = self.refresh_tokens.cleanup_expired(now).await?;

        tracing::info!(verification_codes, refresh_tokens, "Purged expired credentials");
        Ok(PurgeReport {
            verification_codes,
            refresh_tokens,
        })
    }
}
