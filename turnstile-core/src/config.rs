//! Configuration injected into services at construction time.
//!
//! Nothing in this crate reads configuration from the environment; callers build these structs
//! once at startup and hand them to [`crate::services`] constructors.

use std::fmt;

use chrono::Duration;

use crate::error::ValidationError;

/// Minimum pepper length in bytes.
pub const MIN_PEPPER_LEN: usize = 32;

/// Server-side secret mixed into every stored token and code digest.
#[derive(Clone)]
pub struct Pepper(Vec<u8>);

impl Pepper {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, ValidationError> {
        let secret = secret.into();
        if secret.len() < MIN_PEPPER_LEN {
            return Err(ValidationError::InvalidField(format!(
                "Pepper must be at least {MIN_PEPPER_LEN} bytes"
            )));
        }
        Ok(Pepper(secret))
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Pepper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pepper([REDACTED])")
    }
}

/// Account lockout thresholds.
#[derive(Debug, Clone)]
pub struct LockoutConfig {
    pub enabled: bool,
    /// Consecutive failures that trigger a lock.
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(15),
        }
    }
}

impl LockoutConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_max_failed_attempts(mut self, attempts: u32) -> Self {
        self.max_failed_attempts = attempts;
        self
    }

    pub fn with_lockout_duration(mut self, duration: Duration) -> Self {
        self.lockout_duration = duration;
        self
    }
}

/// What a verification request does when the mailer fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MailerFailurePolicy {
    /// Log the failure and report success; the user can ask for another code.
    #[default]
    BestEffort,
    /// Return the failure to the caller as an internal error.
    Propagate,
}

#[derive(Debug, Clone)]
pub struct VerificationConfig {
    pub code_ttl: Duration,
    pub resend_cooldown: Duration,
    pub code_length: usize,
    pub mailer_failure: MailerFailurePolicy,
    /// Issue and mail a code as part of registration.
    pub send_on_registration: bool,
    /// Wrong guesses a code survives; the last one consumes it.
    pub max_attempts: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_ttl: Duration::minutes(15),
            resend_cooldown: Duration::seconds(60),
            code_length: 6,
            mailer_failure: MailerFailurePolicy::BestEffort,
            send_on_registration: true,
            max_attempts: 5,
        }
    }
}

impl VerificationConfig {
    pub fn with_code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    pub fn with_resend_cooldown(mut self, cooldown: Duration) -> Self {
        self.resend_cooldown = cooldown;
        self
    }

    pub fn with_mailer_failure(mut self, policy: MailerFailurePolicy) -> Self {
        self.mailer_failure = policy;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_send_on_registration(mut self, send: bool) -> Self {
        self.send_on_registration = send;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RefreshTokenConfig {
    pub ttl: Duration,
    /// Dead families kept per user after a login; older dead families are pruned. Families
    /// that still hold an active record are never pruned.
    pub retention_cap: u32,
}

impl Default for RefreshTokenConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::days(30),
            retention_cap: 10,
        }
    }
}

impl RefreshTokenConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retention_cap(mut self, cap: u32) -> Self {
        self.retention_cap = cap;
        self
    }
}

/// Argon2id cost parameters. Fixed per deployment, never taken from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHashConfig {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        Self {
            memory_cost_kib: 19_456,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

/// Everything the credential core needs, in one place.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub pepper: Pepper,
    pub lockout: LockoutConfig,
    pub verification: VerificationConfig,
    pub refresh_token: RefreshTokenConfig,
    pub password_hash: PasswordHashConfig,
}

impl AuthConfig {
    pub fn new(pepper: Pepper) -> Self {
        Self {
            pepper,
            lockout: LockoutConfig::default(),
            verification: VerificationConfig::default(),
            refresh_token: RefreshTokenConfig::default(),
            password_hash: PasswordHashConfig::default(),
        }
    }

    pub fn with_lockout(mut self, lockout: LockoutConfig) -> Self {
        self.lockout = lockout;
        self
    }

    pub fn with_verification(mut self, verification: VerificationConfig) -> Self {
        self.verification = verification;
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: RefreshTokenConfig) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    pub fn with_password_hash(mut self, password_hash: PasswordHashConfig) -> Self {
        self.password_hash = password_hash;
        self
    }
}
