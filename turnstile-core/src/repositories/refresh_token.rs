//! Repository traits for refresh-token rotation families.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error, User, UserId,
    storage::{FamilyId, NewRefreshToken, RefreshTokenRecord},
};

/// A unit of work over the refresh token table.
///
/// Rotation runs entirely inside one of these. Dropping a transaction without calling
/// [`commit`](RefreshTokenTransaction::commit) rolls every change back, so an early return
/// or a cancelled future leaves no partial state behind.
#[async_trait]
pub trait RefreshTokenTransaction: Send {
    /// Find a record by hash and hold a row lock on it until the transaction ends.
    ///
    /// Two transactions locking the same hash serialize: the second one only sees the
    /// record after the first has committed or rolled back.
    async fn lock_by_hash(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, Error>;

    /// Read the owner of a locked record through the transaction's connection.
    ///
    /// Backends with row locks also share-lock the user row, so a concurrent ban either lands
    /// before this read or waits until the transaction ends.
    async fn find_owner(&mut self, user_id: &UserId) -> Result<Option<User>, Error>;

    async fn mark_reuse_detected(&mut self, id: i64, at: DateTime<Utc>) -> Result<(), Error>;

    /// Revoke every record of `family_id` that is not revoked yet. Returns how many were.
    async fn revoke_family(
        &mut self,
        family_id: &FamilyId,
        at: DateTime<Utc>,
    ) -> Result<u64, Error>;

    /// Mark `current_id` used and revoked, then insert `successor`.
    async fn rotate(
        &mut self,
        current_id: i64,
        successor: NewRefreshToken,
        at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, Error>;

    async fn commit(self) -> Result<(), Error>;
}

/// Refresh token store.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync + 'static {
    type Transaction: RefreshTokenTransaction;

    async fn begin(&self) -> Result<Self::Transaction, Error>;

    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, Error>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, Error>;

    /// Revoke a single record if it is not revoked already. Returns whether anything changed.
    async fn revoke_by_hash(&self, token_hash: &str, at: DateTime<Utc>) -> Result<bool, Error>;

    async fn revoke_all_for_user(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, Error>;

    /// All records of a family, oldest first.
    async fn list_family(&self, family_id: &FamilyId) -> Result<Vec<RefreshTokenRecord>, Error>;

    /// Delete the user's dead families beyond the `keep` most recent ones.
    ///
    /// A family is dead once none of its records is active at `now`. Families with an active
    /// record are never touched, and neither are their used records, which are needed to
    /// recognise a replay.
    async fn prune_for_user(
        &self,
        user_id: &UserId,
        keep: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, Error>;

    /// Delete records that expired before `before`.
    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
