//! Records persisted by the refresh-token and verification-code repositories.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{UserId, id::generate_prefixed_id};

/// Identifier shared by every refresh token descending from one login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FamilyId(String);

impl FamilyId {
    pub fn new(id: impl Into<String>) -> Self {
        FamilyId(id.into())
    }

    pub fn generate() -> Self {
        FamilyId(generate_prefixed_id("fam"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Forensic metadata captured from the client that presented credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl ClientContext {
    pub fn new(user_agent: Option<String>, ip_address: Option<String>) -> Self {
        Self {
            user_agent,
            ip_address,
        }
    }
}

/// One link in a rotation chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: UserId,
    pub token_hash: String,
    pub family_id: FamilyId,
    pub rotated_from: Option<i64>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub reuse_detected_at: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Used or revoked records must never be exchanged again.
    pub fn is_spent(&self) -> bool {
        self.used_at.is_some() || self.revoked_at.is_some()
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_spent() && !self.is_expired_at(now)
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: UserId,
    pub token_hash: String,
    pub family_id: FamilyId,
    pub rotated_from: Option<i64>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl NewRefreshToken {
    /// Root of a brand new family.
    pub fn root(
        user_id: UserId,
        token_hash: String,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        context: &ClientContext,
    ) -> Self {
        Self {
            user_id,
            token_hash,
            family_id: FamilyId::generate(),
            rotated_from: None,
            issued_at,
            expires_at,
            user_agent: context.user_agent.clone(),
            ip_address: context.ip_address.clone(),
        }
    }

    /// Successor of `parent` within the same family.
    pub fn successor(
        parent: &RefreshTokenRecord,
        token_hash: String,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        context: &ClientContext,
    ) -> Self {
        Self {
            user_id: parent.user_id,
            token_hash,
            family_id: parent.family_id.clone(),
            rotated_from: Some(parent.id),
            issued_at,
            expires_at,
            user_agent: context.user_agent.clone(),
            ip_address: context.ip_address.clone(),
        }
    }
}

/// Single-use proof of email ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCode {
    pub id: i64,
    pub user_id: UserId,
    pub email: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VerificationCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewVerificationCode {
    pub user_id: UserId,
    pub email: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(now: DateTime<Utc>) -> RefreshTokenRecord {
        RefreshTokenRecord {
            id: 1,
            user_id: UserId::new(1),
            token_hash: "hash".to_string(),
            family_id: FamilyId::generate(),
            rotated_from: None,
            issued_at: now,
            expires_at: now + Duration::days(1),
            used_at: None,
            revoked_at: None,
            reuse_detected_at: None,
            user_agent: None,
            ip_address: None,
        }
    }

    #[test]
    fn test_record_states() {
        let now = Utc::now();
        let mut r = record(now);
        assert!(r.is_active_at(now));

        assert!(r.is_expired_at(now + Duration::days(2)));
        assert!(!r.is_active_at(now + Duration::days(2)));

        r.revoked_at = Some(now);
        assert!(r.is_spent());
        assert!(!r.is_active_at(now));
    }

    #[test]
    fn test_successor_stays_in_family() {
        let now = Utc::now();
        let parent = record(now);
        let ctx = ClientContext::new(Some("agent".to_string()), None);
        let child = NewRefreshToken::successor(
            &parent,
            "next".to_string(),
            now,
            now + Duration::days(1),
            &ctx,
        );
        assert_eq!(child.family_id, parent.family_id);
        assert_eq!(child.rotated_from, Some(parent.id));
        assert_eq!(child.user_agent.as_deref(), Some("agent"));
    }

    #[test]
    fn test_family_ids_are_prefixed_and_unique() {
        let a = FamilyId::generate();
        let b = FamilyId::generate();
        assert!(a.as_str().starts_with("fam_"));
        assert_ne!(a, b);
    }
}
