//! Cryptographic utilities for refresh tokens and verification codes
//!
//! Raw refresh tokens and verification codes are never persisted. The stores only ever see a
//! peppered HMAC-SHA256 digest, so a leaked database alone is not enough to forge or replay a
//! credential. Lookups are done by digest and any comparison against a stored digest goes through
//! [`constant_time_compare`].
//!
//! Refresh tokens carry 256 bits of entropy, so a keyed hash is sufficient and a slow password
//! hash would only add latency to every refresh.

use hmac::{Hmac, Mac};
use rand::{Rng, TryRngCore, rngs::OsRng};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::Pepper;

type HmacSha256 = Hmac<Sha256>;

/// Generate a cryptographically secure random token.
///
/// Returns 32 random bytes encoded as URL-safe base64 without padding (43 characters).
///
/// # Panics
///
/// Panics if the OS random number generator fails. This indicates a critical
/// system failure from which recovery is not possible for security-sensitive operations.
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Generate a numeric code of `length` digits, suitable for typing from an email.
pub fn generate_numeric_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Perform constant-time comparison of two byte slices.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Peppered digests for stored secrets.
///
/// Each purpose uses its own domain prefix so a refresh-token digest can never collide with a
/// verification-code digest even when the inputs are identical.
#[derive(Clone, Debug)]
pub struct TokenHasher {
    pepper: Pepper,
}

impl TokenHasher {
    pub fn new(pepper: Pepper) -> Self {
        Self { pepper }
    }

    pub fn hash_refresh_token(&self, raw: &str) -> String {
        self.digest(&["refresh", raw])
    }

    /// Codes are short, so the owning email is mixed in to keep digests unique per account.
    pub fn hash_verification_code(&self, email: &str, code: &str) -> String {
        self.digest(&["verify", email, code])
    }

    pub fn verify_verification_code(&self, email: &str, code: &str, stored_hash: &str) -> bool {
        let computed = self.hash_verification_code(email, code);
        constant_time_compare(computed.as_bytes(), stored_hash.as_bytes())
    }

    fn digest(&self, parts: &[&str]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.pepper.expose())
            .expect("HMAC can take key of any size");
        for part in parts {
            mac.update(part.as_bytes());
            mac.update(b"\x1f");
        }
        hex::encode(mac.finalize().into_bytes())
    }
}
