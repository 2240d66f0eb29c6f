//! Access-token signing.
//!
//! The credential core only needs `issue` and `verify`; the token format lives behind
//! [`AccessTokenSigner`]. [`JwtSigner`] is the bundled implementation.

use std::path::Path;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Error, Role, UserId,
    error::{CryptoError, TokenError, ValidationError},
};

/// Identity recovered from a valid access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub user_id: UserId,
    pub role: Role,
}

pub trait AccessTokenSigner: Send + Sync + 'static {
    fn issue(&self, user_id: UserId, role: Role) -> Result<String, Error>;

    fn verify(&self, token: &str) -> Result<AccessClaims, Error>;
}

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject - user ID
    pub sub: String,
    pub role: Role,
    /// Issued at in seconds (as UTC timestamp)
    pub iat: i64,
    /// Expiration time in seconds (as UTC timestamp)
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Unique token ID
    pub jti: String,
}

/// JWT algorithm type
#[derive(Debug, Clone)]
pub enum JwtAlgorithm {
    /// RS256 - RSA with SHA-256
    RS256 {
        /// Private key for signing JWTs (PEM format)
        private_key: Vec<u8>,
        /// Public key for verifying JWTs (PEM format)
        public_key: Vec<u8>,
    },
    /// HS256 - HMAC with SHA-256
    HS256 {
        /// Secret key for both signing and verifying
        secret_key: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub algorithm: JwtAlgorithm,
    pub issuer: Option<String>,
    /// Lifetime of issued access tokens
    pub access_ttl: Duration,
}

impl JwtConfig {
    pub fn new_rs256(private_key: Vec<u8>, public_key: Vec<u8>) -> Self {
        Self {
            algorithm: JwtAlgorithm::RS256 {
                private_key,
                public_key,
            },
            issuer: None,
            access_ttl: Duration::minutes(15),
        }
    }

    pub fn new_hs256(secret_key: Vec<u8>) -> Self {
        Self {
            algorithm: JwtAlgorithm::HS256 { secret_key },
            issuer: None,
            access_ttl: Duration::minutes(15),
        }
    }

    /// Create a new JWT configuration from RSA key files (PEM format)
    pub fn from_rs256_pem_files(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
    ) -> Result<Self, Error> {
        let private_key = std::fs::read(private_key_path).map_err(|e| {
            ValidationError::InvalidField(format!("Failed to read private key file: {e}"))
        })?;
        let public_key = std::fs::read(public_key_path).map_err(|e| {
            ValidationError::InvalidField(format!("Failed to read public key file: {e}"))
        })?;

        Ok(Self::new_rs256(private_key, public_key))
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    fn jwt_algorithm(&self) -> Algorithm {
        match &self.algorithm {
            JwtAlgorithm::RS256 { .. } => Algorithm::RS256,
            JwtAlgorithm::HS256 { .. } => Algorithm::HS256,
        }
    }
}

/// [`AccessTokenSigner`] backed by `jsonwebtoken`.
///
/// Keys are parsed once at construction so a bad PEM fails at startup instead of on the
/// first login.
pub struct JwtSigner {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtSigner {
    pub fn new(config: JwtConfig) -> Result<Self, Error> {
        let (encoding_key, decoding_key) = match &config.algorithm {
            JwtAlgorithm::RS256 {
                private_key,
                public_key,
            } => (
                EncodingKey::from_rsa_pem(private_key).map_err(|e| {
                    ValidationError::InvalidField(format!("Invalid RSA private key: {e}"))
                })?,
                DecodingKey::from_rsa_pem(public_key).map_err(|e| {
                    ValidationError::InvalidField(format!("Invalid RSA public key: {e}"))
                })?,
            ),
            JwtAlgorithm::HS256 { secret_key } => (
                EncodingKey::from_secret(secret_key),
                DecodingKey::from_secret(secret_key),
            ),
        };

        let mut validation = Validation::new(config.jwt_algorithm());
        validation.leeway = 0;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
            validation,
        })
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }
}

impl AccessTokenSigner for JwtSigner {
    fn issue(&self, user_id: UserId, role: Role) -> Result<String, Error> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.config.access_ttl).timestamp(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::new(self.config.jwt_algorithm()),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| CryptoError::TokenSigning(format!("Failed to encode JWT: {e}")).into())
    }

    fn verify(&self, token: &str) -> Result<AccessClaims, Error> {
        let data = decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| TokenError::InvalidAccessToken(format!("JWT validation failed: {e}")))?;

        let user_id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| TokenError::InvalidAccessToken("Malformed subject".to_string()))?;

        Ok(AccessClaims {
            user_id: UserId::new(user_id),
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SECRET: &[u8] = b"this_is_a_test_secret_key_for_hs256_jwt_tokens_not_for_prod";

    #[test]
    fn test_issue_and_verify() {
        let signer = JwtSigner::new(JwtConfig::new_hs256(SECRET.to_vec())).unwrap();
        let token = signer.issue(UserId::new(42), Role::StudioOwner).unwrap();

        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.user_id, UserId::new(42));
        assert_eq!(claims.role, Role::StudioOwner);
    }

    #[test]
    fn test_tokens_are_unique() {
        let signer = JwtSigner::new(JwtConfig::new_hs256(SECRET.to_vec())).unwrap();
        let a = signer.issue(UserId::new(1), Role::Client).unwrap();
        let b = signer.issue(UserId::new(1), Role::Client).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signer = JwtSigner::new(JwtConfig::new_hs256(SECRET.to_vec())).unwrap();
        let other = JwtSigner::new(JwtConfig::new_hs256(b"another-secret".to_vec())).unwrap();
        let token = signer.issue(UserId::new(1), Role::Client).unwrap();

        let err = other.verify(&token).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAccessToken);
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = JwtSigner::new(
            JwtConfig::new_hs256(SECRET.to_vec()).with_access_ttl(Duration::seconds(-10)),
        )
        .unwrap();
        let token = signer.issue(UserId::new(1), Role::Client).unwrap();
        assert!(signer.verify(&token).is_err());
    }

    #[test]
    fn test_issuer_enforced() {
        let signer =
            JwtSigner::new(JwtConfig::new_hs256(SECRET.to_vec()).with_issuer("turnstile")).unwrap();
        let foreign =
            JwtSigner::new(JwtConfig::new_hs256(SECRET.to_vec()).with_issuer("elsewhere")).unwrap();

        let token = foreign.issue(UserId::new(1), Role::Admin).unwrap();
        assert!(signer.verify(&token).is_err());
        assert!(foreign.verify(&token).is_ok());
    }

    #[test]
    fn test_invalid_rsa_key_fails_at_construction() {
        let config = JwtConfig::new_rs256(b"not a key".to_vec(), b"not a key".to_vec());
        assert!(JwtSigner::new(config).is_err());
    }
}
