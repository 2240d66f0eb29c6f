use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Numeric identifier assigned by the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        UserId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Client,
    StudioOwner,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::StudioOwner => "studio_owner",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "studio_owner" => Ok(Role::StudioOwner),
            "admin" => Ok(Role::Admin),
            other => Err(ValidationError::InvalidField(format!("Unknown role: {other}"))),
        }
    }
}

/// A registered account.
///
/// The password hash is deliberately not part of this struct; it is only reachable through
/// [`UserRepository::get_password_hash`](crate::repositories::UserRepository::get_password_hash)
/// so it can never be serialized into a response by accident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub banned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn builder() -> UserBuilder {
        UserBuilder::default()
    }

    /// Either the verified flag or an externally supplied verification timestamp is enough.
    pub fn is_email_verified(&self) -> bool {
        self.email_verified || self.email_verified_at.is_some()
    }

    pub fn is_banned(&self) -> bool {
        self.is_banned
    }
}

#[derive(Default)]
pub struct UserBuilder {
    id: Option<UserId>,
    email: Option<String>,
    role: Role,
    email_verified_at: Option<DateTime<Utc>>,
    failed_login_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
    ban_reason: Option<String>,
    banned_at: Option<DateTime<Utc>>,
    is_banned: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl UserBuilder {
    pub fn id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn email_verified_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.email_verified_at = at;
        self
    }

    pub fn failed_login_attempts(mut self, attempts: u32) -> Self {
        self.failed_login_attempts = attempts;
        self
    }

    pub fn locked_until(mut self, until: Option<DateTime<Utc>>) -> Self {
        self.locked_until = until;
        self
    }

    pub fn banned(mut self, reason: Option<String>, at: DateTime<Utc>) -> Self {
        self.is_banned = true;
        self.ban_reason = reason;
        self.banned_at = Some(at);
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    pub fn build(self) -> Result<User, ValidationError> {
        let now = Utc::now();
        Ok(User {
            id: self
                .id
                .ok_or_else(|| ValidationError::MissingField("id".to_string()))?,
            email: self
                .email
                .ok_or_else(|| ValidationError::MissingField("email".to_string()))?,
            role: self.role,
            email_verified: self.email_verified_at.is_some(),
            email_verified_at: self.email_verified_at,
            failed_login_attempts: self.failed_login_attempts,
            locked_until: self.locked_until,
            is_banned: self.is_banned,
            ban_reason: self.ban_reason,
            banned_at: self.banned_at,
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
        })
    }
}

/// Input for [`UserRepository::create`](crate::repositories::UserRepository::create).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

impl NewUser {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: password_hash.into(),
            role: Role::default(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_through_str() {
        for role in [Role::Client, Role::StudioOwner, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_builder_requires_id_and_email() {
        assert!(User::builder().email("a@x.com").build().is_err());
        assert!(User::builder().id(UserId::new(1)).build().is_err());

        let user = User::builder()
            .id(UserId::new(1))
            .email("a@x.com")
            .build()
            .unwrap();
        assert_eq!(user.role, Role::Client);
        assert!(!user.is_email_verified());
        assert_eq!(user.failed_login_attempts, 0);
    }

    #[test]
    fn test_verified_timestamp_alone_counts_as_verified() {
        let mut user = User::builder()
            .id(UserId::new(7))
            .email("a@x.com")
            .build()
            .unwrap();
        user.email_verified_at = Some(Utc::now());
        assert!(!user.email_verified);
        assert!(user.is_email_verified());
    }

    #[test]
    fn test_serialized_user_has_no_password_field() {
        let user = User::builder()
            .id(UserId::new(1))
            .email("a@x.com")
            .build()
            .unwrap();
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["id"], 1);
        assert_eq!(json["role"], "client");
    }
}
