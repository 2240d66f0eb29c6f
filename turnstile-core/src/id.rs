//! Prefixed random identifiers, e.g. `fam_8Jx2...`.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};

/// Generate a `{prefix}_{random}` ID carrying 96 bits of entropy.
///
/// # Panics
///
/// Panics if the OS random number generator fails.
pub fn generate_prefixed_id(prefix: &str) -> String {
    let mut bytes = [0u8; 12];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");

    format!("{prefix}_{}", BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_prefixed_id() {
        let id = generate_prefixed_id("fam");
        assert!(id.starts_with("fam_"));

        let decoded = BASE64_URL_SAFE_NO_PAD.decode(&id[4..]).unwrap();
        assert_eq!(decoded.len(), 12);

        assert_ne!(id, generate_prefixed_id("fam"));
    }

    #[test]
    fn test_id_is_url_safe() {
        let id = generate_prefixed_id("fam");
        assert!(
            id.chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        );
    }
}
