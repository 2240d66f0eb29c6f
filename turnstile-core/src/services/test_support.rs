//! In-memory repositories and collaborators shared by the service tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use crate::{
    Error, User, UserId,
    error::{AuthError, MailerError, StorageError},
    mailer::VerificationMailer,
    repositories::{
        RefreshTokenRepository, RefreshTokenTransaction, UserRepository,
        VerificationCodeRepository,
    },
    storage::{
        FamilyId, NewRefreshToken, NewVerificationCode, RefreshTokenRecord, VerificationCode,
    },
    user::NewUser,
};

#[derive(Default)]
pub struct MockUserRepository {
    users: Mutex<Vec<(User, String)>>,
}

impl MockUserRepository {
    pub fn get(&self, id: UserId) -> User {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u.id == id)
            .map(|(u, _)| u.clone())
            .unwrap()
    }

    pub fn set(&self, user: User) {
        let mut users = self.users.lock().unwrap();
        let slot = users.iter_mut().find(|(u, _)| u.id == user.id).unwrap();
        slot.0 = user;
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|(u, _)| u.email == user.email) {
            return Err(AuthError::DuplicateEmail.into());
        }
        let created = User::builder()
            .id(UserId::new(users.len() as i64 + 1))
            .email(user.email)
            .role(user.role)
            .build()?;
        users.push((created.clone(), user.password_hash));
        Ok(created)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|(u, _)| u.id == *id).map(|(u, _)| u.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|(u, _)| u.email == email)
            .map(|(u, _)| u.clone()))
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, Error> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    async fn update(&self, user: &User) -> Result<User, Error> {
        let mut users = self.users.lock().unwrap();
        let slot = users
            .iter_mut()
            .find(|(u, _)| u.id == user.id)
            .ok_or(StorageError::NotFound)?;
        slot.0 = user.clone();
        Ok(user.clone())
    }

    async fn get_password_hash(&self, id: &UserId) -> Result<Option<String>, Error> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|(u, _)| u.id == *id).map(|(_, h)| h.clone()))
    }

    async fn mark_email_verified(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), Error> {
        let mut users = self.users.lock().unwrap();
        if let Some((u, _)) = users.iter_mut().find(|(u, _)| u.id == *id) {
            u.email_verified = true;
            u.email_verified_at = Some(at);
        }
        Ok(())
    }

    async fn update_lockout(
        &self,
        id: &UserId,
        failed_login_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        let mut users = self.users.lock().unwrap();
        if let Some((u, _)) = users.iter_mut().find(|(u, _)| u.id == *id) {
            u.failed_login_attempts = failed_login_attempts;
            u.locked_until = locked_until;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockVerificationCodeRepository {
    pub codes: Mutex<Vec<VerificationCode>>,
    /// Wrong guesses per code id
    pub failures: Mutex<Vec<(i64, u32)>>,
}

#[async_trait]
impl VerificationCodeRepository for MockVerificationCodeRepository {
    async fn create(&self, code: NewVerificationCode) -> Result<VerificationCode, Error> {
        let mut codes = self.codes.lock().unwrap();
        let created = VerificationCode {
            id: codes.len() as i64 + 1,
            user_id: code.user_id,
            email: code.email,
            code_hash: code.code_hash,
            expires_at: code.expires_at,
            used_at: None,
            created_at: code.created_at,
        };
        codes.push(created.clone());
        Ok(created)
    }

    async fn find_latest_unused(&self, email: &str) -> Result<Option<VerificationCode>, Error> {
        let codes = self.codes.lock().unwrap();
        Ok(codes
            .iter()
            .filter(|c| c.email == email && c.used_at.is_none())
            .max_by_key(|c| c.id)
            .cloned())
    }

    async fn mark_used(&self, id: i64, at: DateTime<Utc>) -> Result<bool, Error> {
        let mut codes = self.codes.lock().unwrap();
        match codes.iter_mut().find(|c| c.id == id && c.used_at.is_none()) {
            Some(code) => {
                code.used_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_failed_attempt(
        &self,
        id: i64,
        max_attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut codes = self.codes.lock().unwrap();
        let Some(code) = codes.iter_mut().find(|c| c.id == id && c.used_at.is_none()) else {
            return Ok(false);
        };

        let mut failures = self.failures.lock().unwrap();
        let count = match failures.iter_mut().find(|(code_id, _)| *code_id == id) {
            Some((_, count)) => {
                *count += 1;
                *count
            }
            None => {
                failures.push((id, 1));
                1
            }
        };

        if count >= max_attempts {
            code.used_at = Some(at);
            return Ok(true);
        }
        Ok(false)
    }

    async fn supersede_unused(&self, email: &str, at: DateTime<Utc>) -> Result<u64, Error> {
        let mut codes = self.codes.lock().unwrap();
        let mut count = 0;
        for code in codes
            .iter_mut()
            .filter(|c| c.email == email && c.used_at.is_none())
        {
            code.used_at = Some(at);
            count += 1;
        }
        Ok(count)
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let mut codes = self.codes.lock().unwrap();
        let len = codes.len();
        codes.retain(|c| c.expires_at >= before);
        Ok((len - codes.len()) as u64)
    }
}

/// Refresh token store whose transactions hold a store-wide lock and work on a staged copy,
/// committed back only on [`RefreshTokenTransaction::commit`].
#[derive(Default)]
pub struct MockRefreshTokenRepository {
    records: Arc<Mutex<Vec<RefreshTokenRecord>>>,
    lock: Arc<tokio::sync::Mutex<()>>,
    users: Option<Arc<MockUserRepository>>,
}

impl MockRefreshTokenRepository {
    /// Transactions resolve token owners against `users`.
    pub fn with_users(users: Arc<MockUserRepository>) -> Self {
        Self {
            users: Some(users),
            ..Self::default()
        }
    }

    pub fn all(&self) -> Vec<RefreshTokenRecord> {
        self.records.lock().unwrap().clone()
    }
}

fn insert(records: &mut Vec<RefreshTokenRecord>, token: NewRefreshToken) -> RefreshTokenRecord {
    let record = RefreshTokenRecord {
        id: records.iter().map(|r| r.id).max().unwrap_or(0) + 1,
        user_id: token.user_id,
        token_hash: token.token_hash,
        family_id: token.family_id,
        rotated_from: token.rotated_from,
        issued_at: token.issued_at,
        expires_at: token.expires_at,
        used_at: None,
        revoked_at: None,
        reuse_detected_at: None,
        user_agent: token.user_agent,
        ip_address: token.ip_address,
    };
    records.push(record.clone());
    record
}

pub struct MockTransaction {
    _guard: OwnedMutexGuard<()>,
    staged: Vec<RefreshTokenRecord>,
    store: Arc<Mutex<Vec<RefreshTokenRecord>>>,
    users: Option<Arc<MockUserRepository>>,
}

#[async_trait]
impl RefreshTokenTransaction for MockTransaction {
    async fn lock_by_hash(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, Error> {
        Ok(self
            .staged
            .iter()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn find_owner(&mut self, user_id: &UserId) -> Result<Option<User>, Error> {
        match &self.users {
            Some(users) => users.find_by_id(user_id).await,
            None => Ok(None),
        }
    }

    async fn mark_reuse_detected(&mut self, id: i64, at: DateTime<Utc>) -> Result<(), Error> {
        if let Some(r) = self.staged.iter_mut().find(|r| r.id == id) {
            r.reuse_detected_at = Some(at);
        }
        Ok(())
    }

    async fn revoke_family(
        &mut self,
        family_id: &FamilyId,
        at: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let mut count = 0;
        for r in self
            .staged
            .iter_mut()
            .filter(|r| &r.family_id == family_id && r.revoked_at.is_none())
        {
            r.revoked_at = Some(at);
            count += 1;
        }
        Ok(count)
    }

    async fn rotate(
        &mut self,
        current_id: i64,
        successor: NewRefreshToken,
        at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, Error> {
        let current = self
            .staged
            .iter_mut()
            .find(|r| r.id == current_id)
            .ok_or(StorageError::NotFound)?;
        current.used_at = Some(at);
        current.revoked_at = Some(at);
        Ok(insert(&mut self.staged, successor))
    }

    async fn commit(self) -> Result<(), Error> {
        *self.store.lock().unwrap() = self.staged;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenRepository for MockRefreshTokenRepository {
    type Transaction = MockTransaction;

    async fn begin(&self) -> Result<Self::Transaction, Error> {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        let staged = self.records.lock().unwrap().clone();
        Ok(MockTransaction {
            _guard: guard,
            staged,
            store: Arc::clone(&self.records),
            users: self.users.clone(),
        })
    }

    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, Error> {
        let _guard = self.lock.lock().await;
        Ok(insert(&mut self.records.lock().unwrap(), token))
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, Error> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().find(|r| r.token_hash == token_hash).cloned())
    }

    async fn revoke_by_hash(&self, token_hash: &str, at: DateTime<Utc>) -> Result<bool, Error> {
        let _guard = self.lock.lock().await;
        let mut records = self.records.lock().unwrap();
        match records
            .iter_mut()
            .find(|r| r.token_hash == token_hash && r.revoked_at.is_none())
        {
            Some(r) => {
                r.revoked_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let _guard = self.lock.lock().await;
        let mut records = self.records.lock().unwrap();
        let mut count = 0;
        for r in records
            .iter_mut()
            .filter(|r| r.user_id == *user_id && r.revoked_at.is_none())
        {
            r.revoked_at = Some(at);
            count += 1;
        }
        Ok(count)
    }

    async fn list_family(&self, family_id: &FamilyId) -> Result<Vec<RefreshTokenRecord>, Error> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| &r.family_id == family_id)
            .cloned()
            .collect())
    }

    async fn prune_for_user(
        &self,
        user_id: &UserId,
        keep: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let _guard = self.lock.lock().await;
        let mut records = self.records.lock().unwrap();

        // (family, newest id) for every family of the user without an active record
        let mut dead: Vec<(FamilyId, i64)> = Vec::new();
        for r in records.iter().filter(|r| r.user_id == *user_id) {
            let live = records
                .iter()
                .any(|o| o.family_id == r.family_id && o.is_active_at(now));
            if live {
                continue;
            }
            match dead.iter_mut().find(|(f, _)| *f == r.family_id) {
                Some((_, newest)) => *newest = (*newest).max(r.id),
                None => dead.push((r.family_id.clone(), r.id)),
            }
        }
        dead.sort_unstable_by(|a, b| b.1.cmp(&a.1));
        let doomed: Vec<FamilyId> = dead.into_iter().skip(keep as usize).map(|(f, _)| f).collect();

        let len = records.len();
        records.retain(|r| !doomed.contains(&r.family_id));
        Ok((len - records.len()) as u64)
    }

    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let _guard = self.lock.lock().await;
        let mut records = self.records.lock().unwrap();
        let len = records.len();
        records.retain(|r| r.expires_at >= before);
        Ok((len - records.len()) as u64)
    }
}

/// Mailer that remembers every code it was asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }
}

#[async_trait]
impl VerificationMailer for RecordingMailer {
    async fn send_verification_code(&self, email: &str, code: &str) -> Result<(), Error> {
        if self.fail {
            return Err(MailerError::Delivery("mailbox unavailable".to_string()).into());
        }
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), code.to_string()));
        Ok(())
    }
}
