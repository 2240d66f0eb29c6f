//! Password hashing.
//!
//! [`PasswordHasher`] is the seam services depend on; [`Argon2Hasher`] is the production
//! implementation. Hashing is CPU bound, so services run it through [`hash_password`] and
//! [`verify_password`], which move the work onto tokio's blocking pool.

use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use rand::{TryRngCore, rngs::OsRng};

use crate::{Error, config::PasswordHashConfig, error::CryptoError};

/// One-way, salted, deliberately slow password hashing.
pub trait PasswordHasher: Send + Sync + 'static {
    fn hash(&self, plaintext: &str) -> Result<String, Error>;

    /// `Ok(false)` for a wrong password, `Err` only when the stored hash is unusable.
    fn verify(&self, hash: &str, plaintext: &str) -> Result<bool, Error>;
}

/// Argon2id with cost parameters fixed at construction.
#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new(config: &PasswordHashConfig) -> Result<Self, Error> {
        let params = Params::new(
            config.memory_cost_kib,
            config.time_cost,
            config.parallelism,
            None,
        )
        .map_err(|e| CryptoError::PasswordHash(format!("Invalid argon2 parameters: {e}")))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, Error> {
        let mut salt = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| CryptoError::PasswordHash(format!("Failed to generate salt: {e}")))?;
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| CryptoError::PasswordHash(format!("Failed to encode salt: {e}")))?;

        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| CryptoError::PasswordHash(format!("Failed to hash password: {e}")))?;
        Ok(hash.to_string())
    }

    fn verify(&self, hash: &str, plaintext: &str) -> Result<bool, Error> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| CryptoError::PasswordHash(format!("Invalid password hash: {e}")))?;

        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CryptoError::PasswordHash(format!("Failed to verify password: {e}")).into()),
        }
    }
}

pub(crate) async fn hash_password<H: PasswordHasher>(
    hasher: &Arc<H>,
    plaintext: &str,
) -> Result<String, Error> {
    let hasher = Arc::clone(hasher);
    let plaintext = plaintext.to_string();
    tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
        .await
        .map_err(|e| CryptoError::PasswordHash(format!("Hashing task failed: {e}")))?
}

pub(crate) async fn verify_password<H: PasswordHasher>(
    hasher: &Arc<H>,
    hash: &str,
    plaintext: &str,
) -> Result<bool, Error> {
    let hasher = Arc::clone(hasher);
    let hash = hash.to_string();
    let plaintext = plaintext.to_string();
    tokio::task::spawn_blocking(move || hasher.verify(&hash, &plaintext))
        .await
        .map_err(|e| CryptoError::PasswordHash(format!("Verification task failed: {e}")))?
}

#[cfg(test)]
pub(crate) fn test_hasher() -> Argon2Hasher {
    Argon2Hasher::new(&PasswordHashConfig {
        memory_cost_kib: 8,
        time_cost: 1,
        parallelism: 1,
    })
    .unwrap()
}
