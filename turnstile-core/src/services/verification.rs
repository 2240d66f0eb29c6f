//! Email verification gate.
//!
//! Codes are short numeric strings mailed to the user. Only a peppered digest is stored, each
//! code is single use, and at most one live code exists per address: requesting a new one
//! retires the previous ones, and requests inside the resend cooldown are refused.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    Error, User,
    config::{MailerFailurePolicy, VerificationConfig},
    crypto::{TokenHasher, generate_numeric_code},
    error::VerificationError,
    mailer::VerificationMailer,
    repositories::{UserRepository, VerificationCodeRepository},
    storage::NewVerificationCode,
    validation::normalize_email,
};

pub struct EmailVerificationService<U, C, M>
where
    U: UserRepository,
    C: VerificationCodeRepository,
    M: VerificationMailer,
{
    user_repository: Arc<U>,
    code_repository: Arc<C>,
    mailer: Arc<M>,
    hasher: TokenHasher,
    config: VerificationConfig,
}

impl<U, C, M> EmailVerificationService<U, C, M>
where
    U: UserRepository,
    C: VerificationCodeRepository,
    M: VerificationMailer,
{
    pub fn new(
        user_repository: Arc<U>,
        code_repository: Arc<C>,
        mailer: Arc<M>,
        hasher: TokenHasher,
        config: VerificationConfig,
    ) -> Self {
        Self {
            user_repository,
            code_repository,
            mailer,
            hasher,
            config,
        }
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    /// Issue and mail a fresh code for `email`.
    ///
    /// Unknown and already verified addresses get the same `Ok` as a real send so the endpoint
    /// cannot be used to discover accounts.
    pub async fn request_code(&self, email: &str) -> Result<DateTime<Utc>, Error> {
        let email = normalize_email(email);
        let now = Utc::now();

        let user = match self.user_repository.find_by_email(&email).await? {
            Some(user) if !user.is_email_verified() => user,
            _ => {
                tracing::debug!("Verification requested for unknown or verified address");
                return Ok(now);
            }
        };

        self.issue(&user, now).await
    }

    /// Issue a code for a user we already hold, e.g. right after registration.
    pub async fn issue_for(&self, user: &User) -> Result<DateTime<Utc>, Error> {
        self.issue(user, Utc::now()).await
    }

    async fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<DateTime<Utc>, Error> {
        if let Some(latest) = self
            .code_repository
            .find_latest_unused(&user.email)
            .await?
        {
            let available_at = latest.created_at + self.config.resend_cooldown;
            if !latest.is_expired_at(now) && available_at > now {
                let retry_after_seconds = (available_at - now).num_seconds().max(1);
                return Err(VerificationError::ResendTooSoon {
                    retry_after_seconds,
                }
                .into());
            }
        }

        self.code_repository
            .supersede_unused(&user.email, now)
            .await?;

        let code = generate_numeric_code(self.config.code_length);
        self.code_repository
            .create(NewVerificationCode {
                user_id: user.id,
                email: user.email.clone(),
                code_hash: self.hasher.hash_verification_code(&user.email, &code),
                expires_at: now + self.config.code_ttl,
                created_at: now,
            })
            .await?;

        if let Err(e) = self
            .mailer
            .send_verification_code(&user.email, &code)
            .await
        {
            match self.config.mailer_failure {
                MailerFailurePolicy::BestEffort => {
                    tracing::warn!(
                        user_id = %user.id,
                        error = %e,
                        "Failed to deliver verification code"
                    );
                }
                MailerFailurePolicy::Propagate => return Err(e),
            }
        }

        tracing::info!(user_id = %user.id, "Verification code issued");
        Ok(now)
    }

    /// Consume `code` and mark the address verified.
    pub async fn confirm(&self, email: &str, code: &str) -> Result<User, Error> {
        let email = normalize_email(email);
        let now = Utc::now();

        let stored = self
            .code_repository
            .find_latest_unused(&email)
            .await?
            .filter(|c| !c.is_expired_at(now))
            .ok_or(VerificationError::CodeInvalid)?;

        if !self
            .hasher
            .verify_verification_code(&email, code.trim(), &stored.code_hash)
        {
            if self
                .code_repository
                .record_failed_attempt(stored.id, self.config.max_attempts, now)
                .await?
            {
                tracing::warn!(
                    user_id = %stored.user_id,
                    "Verification code consumed after repeated wrong guesses"
                );
            }
            return Err(VerificationError::CodeInvalid.into());
        }

        // A concurrent confirmation may have consumed it between lookup and here.
        if !self.code_repository.mark_used(stored.id, now).await? {
            return Err(VerificationError::CodeInvalid.into());
        }

        let mut user = self
            .user_repository
            .find_by_id(&stored.user_id)
            .await?
            .ok_or(VerificationError::CodeInvalid)?;

        if !user.email_verified {
            self.user_repository
                .mark_email_verified(&user.id, now)
                .await?;
            user.email_verified = true;
            user.email_verified_at = Some(now);
        }

        tracing::info!(user_id = %user.id, "Email verified");
        Ok(user)
    }

    /// Delete codes whose expiry is before `before`.
    pub async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.code_repository.cleanup_expired(before).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Pepper,
        error::ErrorKind,
        services::test_support::{
            MockUserRepository, MockVerificationCodeRepository, RecordingMailer,
        },
        user::NewUser,
    };
    use chrono::Duration;

    type Service =
        EmailVerificationService<MockUserRepository, MockVerificationCodeRepository, RecordingMailer>;

    struct Fixture {
        users: Arc<MockUserRepository>,
        codes: Arc<MockVerificationCodeRepository>,
        mailer: Arc<RecordingMailer>,
        service: Service,
    }

    fn fixture_with(config: VerificationConfig, mailer: RecordingMailer) -> Fixture {
        let users = Arc::new(MockUserRepository::default());
        let codes = Arc::new(MockVerificationCodeRepository::default());
        let mailer = Arc::new(mailer);
        let hasher = TokenHasher::new(Pepper::new(vec![7u8; 32]).unwrap());
        let service = EmailVerificationService::new(
            users.clone(),
            codes.clone(),
            mailer.clone(),
            hasher,
            config,
        );
        Fixture {
            users,
            codes,
            mailer,
            service,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(VerificationConfig::default(), RecordingMailer::default())
    }

    async fn register(f: &Fixture, email: &str) -> User {
        f.users
            .create(NewUser::new(email, "hash"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_and_confirm() {
        let f = fixture();
        register(&f, "a@x.com").await;

        f.service.request_code("A@X.com ").await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").unwrap();

        let stored = f.codes.codes.lock().unwrap()[0].code_hash.clone();
        assert_ne!(stored, code);

        let user = f.service.confirm("a@x.com", &code).await.unwrap();
        assert!(user.is_email_verified());
        assert!(f.users.get(user.id).is_email_verified());
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let f = fixture();
        register(&f, "a@x.com").await;
        f.service.request_code("a@x.com").await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").unwrap();

        f.service.confirm("a@x.com", &code).await.unwrap();
        let err = f.service.confirm("a@x.com", &code).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CodeInvalid);
    }

    #[tokio::test]
    async fn test_wrong_code_rejected_and_left_usable() {
        let f = fixture();
        register(&f, "a@x.com").await;
        f.service.request_code("a@x.com").await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let err = f.service.confirm("a@x.com", wrong).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CodeInvalid);

        assert!(f.service.confirm("a@x.com", &code).await.is_ok());
    }

    #[tokio::test]
    async fn test_code_burned_after_max_wrong_guesses() {
        let f = fixture_with(
            VerificationConfig::default().with_max_attempts(3),
            RecordingMailer::default(),
        );
        register(&f, "a@x.com").await;
        f.service.request_code("a@x.com").await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..3 {
            let err = f.service.confirm("a@x.com", wrong).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CodeInvalid);
        }

        // The right code no longer helps once the guesses are used up
        let err = f.service.confirm("a@x.com", &code).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CodeInvalid);
        assert!(f.codes.codes.lock().unwrap()[0].used_at.is_some());
        assert!(!f.users.get(f.codes.codes.lock().unwrap()[0].user_id).is_email_verified());
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let f = fixture_with(
            VerificationConfig::default().with_code_ttl(Duration::seconds(-1)),
            RecordingMailer::default(),
        );
        register(&f, "a@x.com").await;
        f.service.request_code("a@x.com").await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").unwrap();

        let err = f.service.confirm("a@x.com", &code).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CodeInvalid);
    }

    #[tokio::test]
    async fn test_resend_inside_cooldown_rejected() {
        let f = fixture();
        register(&f, "a@x.com").await;
        f.service.request_code("a@x.com").await.unwrap();

        let err = f.service.request_code("a@x.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResendTooSoon);
        assert_eq!(f.mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resend_after_cooldown_supersedes_previous_code() {
        let f = fixture_with(
            VerificationConfig::default().with_resend_cooldown(Duration::zero()),
            RecordingMailer::default(),
        );
        register(&f, "a@x.com").await;

        f.service.request_code("a@x.com").await.unwrap();
        let first = f.mailer.last_code_for("a@x.com").unwrap();
        f.service.request_code("a@x.com").await.unwrap();
        let second = f.mailer.last_code_for("a@x.com").unwrap();

        let live = f
            .codes
            .codes
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.used_at.is_none())
            .count();
        assert_eq!(live, 1);

        if first != second {
            let err = f.service.confirm("a@x.com", &first).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CodeInvalid);
        }
        assert!(f.service.confirm("a@x.com", &second).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_email_is_silent() {
        let f = fixture();
        assert!(f.service.request_code("ghost@x.com").await.is_ok());
        assert!(f.mailer.sent.lock().unwrap().is_empty());
        assert!(f.codes.codes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mailer_failure_policy() {
        let f = fixture_with(VerificationConfig::default(), RecordingMailer::failing());
        register(&f, "a@x.com").await;
        assert!(f.service.request_code("a@x.com").await.is_ok());

        let f = fixture_with(
            VerificationConfig::default().with_mailer_failure(MailerFailurePolicy::Propagate),
            RecordingMailer::failing(),
        );
        register(&f, "a@x.com").await;
        let err = f.service.request_code("a@x.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
