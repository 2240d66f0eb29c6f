//! Account lockout policy.
//!
//! Lockout state lives on the user row (`failed_login_attempts`, `locked_until`). This module is
//! pure: it reads that state and computes the next one, and callers persist the result with a
//! single [`UserRepository::update_lockout`](crate::repositories::UserRepository::update_lockout)
//! call.
//!
//! ```rust
//! use chrono::Utc;
//! use turnstile_core::{User, UserId, config::LockoutConfig, services::LockoutPolicy};
//!
//! let policy = LockoutPolicy::new(LockoutConfig::default());
//! let user = User::builder()
//!     .id(UserId::new(1))
//!     .email("a@x.com")
//!     .failed_login_attempts(4)
//!     .build()
//!     .unwrap();
//!
//! let update = policy.on_failure(&user, Utc::now()).unwrap();
//! assert_eq!(update.failed_login_attempts, 5);
//! assert!(update.locked_until.is_some());
//! ```

use chrono::{DateTime, Utc};

use crate::{User, config::LockoutConfig};

/// Lockout state derived for one account at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutStatus {
    /// Failures counted toward the threshold. Zero once an old lock window has elapsed.
    pub failed_attempts: u32,
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutStatus {
    fn unlocked(failed_attempts: u32) -> Self {
        Self {
            failed_attempts,
            is_locked: false,
            locked_until: None,
        }
    }

    /// Seconds until the lock lifts, rounded up. `None` when not locked.
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.locked_until
            .filter(|_| self.is_locked)
            .map(|until| {
                let millis = (until - now).num_milliseconds().max(0);
                (millis + 999) / 1000
            })
    }
}

/// New values for the lockout columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutUpdate {
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutUpdate {
    pub fn cleared() -> Self {
        Self {
            failed_login_attempts: 0,
            locked_until: None,
        }
    }

    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    config: LockoutConfig,
}

impl LockoutPolicy {
    pub fn new(config: LockoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn status(&self, user: &User, now: DateTime<Utc>) -> LockoutStatus {
        if !self.config.enabled {
            return LockoutStatus::unlocked(0);
        }

        match user.locked_until {
            Some(until) if until > now => LockoutStatus {
                failed_attempts: user.failed_login_attempts,
                is_locked: true,
                locked_until: Some(until),
            },
            // The window has fully elapsed: the counter starts over.
            Some(_) => LockoutStatus::unlocked(0),
            None => LockoutStatus::unlocked(user.failed_login_attempts),
        }
    }

    /// State after one more failed password check, or `None` when lockout is disabled.
    pub fn on_failure(&self, user: &User, now: DateTime<Utc>) -> Option<LockoutUpdate> {
        if !self.config.enabled {
            return None;
        }

        let attempts = self
            .status(user, now)
            .failed_attempts
            .saturating_add(1);

        let locked_until = if attempts >= self.config.max_failed_attempts {
            Some(now + self.config.lockout_duration)
        } else {
            None
        };

        Some(LockoutUpdate {
            failed_login_attempts: attempts,
            locked_until,
        })
    }

    /// State after a successful login, or `None` when there is nothing to clear.
    pub fn on_success(&self, user: &User) -> Option<LockoutUpdate> {
        if user.failed_login_attempts != 0 || user.locked_until.is_some() {
            Some(LockoutUpdate::cleared())
        } else {
            None
        }
    }
}
