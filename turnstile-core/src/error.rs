use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Mailer error: {0}")]
    Mailer(#[from] MailerError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Account locked until {locked_until}")]
    AccountLocked { locked_until: DateTime<Utc> },

    #[error("Account banned")]
    AccountBanned,

    #[error("Email not verified")]
    EmailNotVerified,

    #[error("User not found")]
    UserNotFound,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token reused")]
    RefreshTokenReused,

    #[error("Invalid access token: {0}")]
    InvalidAccessToken(String),
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Verification code invalid")]
    CodeInvalid,

    #[error("Verification code requested too soon, retry in {retry_after_seconds}s")]
    ResendTooSoon { retry_after_seconds: i64 },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Token signing failed: {0}")]
    TokenSigning(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Caller-facing classification of an [`Error`].
///
/// Boundary layers (HTTP handlers, RPC servers) map kinds to status codes. Every error maps to
/// exactly one kind, and storage, crypto and mailer failures all collapse into
/// [`ErrorKind::Internal`] so implementation details never reach a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidCredentials,
    DuplicateEmail,
    AccountLocked,
    AccountBanned,
    EmailNotVerified,
    CodeInvalid,
    ResendTooSoon,
    InvalidRefreshToken,
    RefreshTokenReused,
    InvalidAccessToken,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::DuplicateEmail => "duplicate_email",
            ErrorKind::AccountLocked => "account_locked",
            ErrorKind::AccountBanned => "account_banned",
            ErrorKind::EmailNotVerified => "email_not_verified",
            ErrorKind::CodeInvalid => "code_invalid",
            ErrorKind::ResendTooSoon => "resend_too_soon",
            ErrorKind::InvalidRefreshToken => "invalid_refresh_token",
            ErrorKind::RefreshTokenReused => "refresh_token_reused",
            ErrorKind::InvalidAccessToken => "invalid_access_token",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth(AuthError::InvalidCredentials | AuthError::UserNotFound) => {
                ErrorKind::InvalidCredentials
            }
            Error::Auth(AuthError::DuplicateEmail) => ErrorKind::DuplicateEmail,
            Error::Auth(AuthError::AccountLocked { .. }) => ErrorKind::AccountLocked,
            Error::Auth(AuthError::AccountBanned) => ErrorKind::AccountBanned,
            Error::Auth(AuthError::EmailNotVerified) => ErrorKind::EmailNotVerified,
            Error::Token(TokenError::InvalidRefreshToken) => ErrorKind::InvalidRefreshToken,
            Error::Token(TokenError::InvalidAccessToken(_)) => ErrorKind::InvalidAccessToken,
            Error::Token(TokenError::RefreshTokenReused) => ErrorKind::RefreshTokenReused,
            Error::Verification(VerificationError::CodeInvalid) => ErrorKind::CodeInvalid,
            Error::Verification(VerificationError::ResendTooSoon { .. }) => {
                ErrorKind::ResendTooSoon
            }
            Error::Validation(_) => ErrorKind::Validation,
            Error::Storage(_) | Error::Crypto(_) | Error::Mailer(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show to a client. Internal failures are replaced by a generic string.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal error".to_string(),
            ErrorKind::InvalidCredentials => AuthError::InvalidCredentials.to_string(),
            _ => match self {
                Error::Auth(e) => e.to_string(),
                Error::Token(e) => e.to_string(),
                Error::Verification(e) => e.to_string(),
                Error::Validation(e) => e.to_string(),
                _ => "Internal error".to_string(),
            },
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    pub fn is_token_error(&self) -> bool {
        matches!(self, Error::Token(_))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let auth_error = Error::Auth(AuthError::InvalidCredentials);
        assert_eq!(
            auth_error.to_string(),
            "Authentication error: Invalid credentials"
        );

        let validation_error =
            Error::Validation(ValidationError::InvalidEmail("test@".to_string()));
        assert_eq!(
            validation_error.to_string(),
            "Validation error: Invalid email format: test@"
        );

        let storage_error = Error::Storage(StorageError::NotFound);
        assert_eq!(storage_error.to_string(), "Storage error: Record not found");
    }

    #[test]
    fn test_every_domain_error_has_distinct_kind() {
        let cases = vec![
            (Error::from(AuthError::InvalidCredentials), ErrorKind::InvalidCredentials),
            (Error::from(AuthError::DuplicateEmail), ErrorKind::DuplicateEmail),
            (
                Error::from(AuthError::AccountLocked {
                    locked_until: Utc::now(),
                }),
                ErrorKind::AccountLocked,
            ),
            (Error::from(AuthError::AccountBanned), ErrorKind::AccountBanned),
            (Error::from(AuthError::EmailNotVerified), ErrorKind::EmailNotVerified),
            (Error::from(VerificationError::CodeInvalid), ErrorKind::CodeInvalid),
            (
                Error::from(VerificationError::ResendTooSoon {
                    retry_after_seconds: 30,
                }),
                ErrorKind::ResendTooSoon,
            ),
            (Error::from(TokenError::InvalidRefreshToken), ErrorKind::InvalidRefreshToken),
            (Error::from(TokenError::RefreshTokenReused), ErrorKind::RefreshTokenReused),
            (
                Error::from(StorageError::Database("boom".to_string())),
                ErrorKind::Internal,
            ),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
        }
    }

    #[test]
    fn test_user_not_found_is_indistinguishable_from_bad_password() {
        let missing = Error::from(AuthError::UserNotFound);
        let wrong = Error::from(AuthError::InvalidCredentials);
        assert_eq!(missing.kind(), wrong.kind());
        assert_eq!(missing.public_message(), wrong.public_message());
    }

    #[test]
    fn test_internal_errors_do_not_leak_details() {
        let error = Error::from(StorageError::Database(
            "UNIQUE constraint failed: users.email".to_string(),
        ));
        assert!(error.is_internal());
        assert_eq!(error.public_message(), "Internal error");

        let error = Error::from(MailerError::Delivery("smtp timeout".to_string()));
        assert_eq!(error.public_message(), "Internal error");
    }

    #[test]
    fn test_kind_as_str() {
        assert_eq!(ErrorKind::RefreshTokenReused.as_str(), "refresh_token_reused");
        assert_eq!(ErrorKind::AccountLocked.to_string(), "account_locked");
    }

    #[test]
    fn test_is_helpers() {
        assert!(Error::from(AuthError::AccountBanned).is_auth_error());
        assert!(Error::from(TokenError::RefreshTokenReused).is_token_error());
        assert!(Error::from(StorageError::NotFound).is_storage_error());
        assert!(
            Error::from(ValidationError::MissingField("email".to_string())).is_validation_error()
        );
        assert!(!Error::from(AuthError::InvalidCredentials).is_storage_error());
    }
}
