//! Input validation and normalisation shared by every service.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_PASSWORD_CHARS: usize = 128;

/// RFC 5321 path limit.
const MAX_EMAIL_LEN: usize = 254;

/// Practical subset of RFC 5322, applied to already-normalised addresses.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").expect("email pattern compiles")
});

/// Trim and lower-case an email address.
///
/// Every lookup and every write goes through this so that uniqueness is case-insensitive.
///
/// ```rust
/// use turnstile_core::validation::normalize_email;
///
/// assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
/// ```
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check the shape of a normalised address. Deliverability is proven by the verification code.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    match email.len() {
        0 => Err(ValidationError::MissingField("email".to_string())),
        n if n > MAX_EMAIL_LEN => Err(ValidationError::InvalidEmail(format!(
            "longer than {MAX_EMAIL_LEN} bytes"
        ))),
        _ if !EMAIL_REGEX.is_match(email) => {
            Err(ValidationError::InvalidEmail(email.to_string()))
        }
        _ => Ok(()),
    }
}

/// Length bounds only, counted in characters. Composition rules are left to the caller.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingField("password".to_string()));
    }
    if password.trim().is_empty() {
        return Err(ValidationError::InvalidPassword(
            "must contain a non-whitespace character".to_string(),
        ));
    }

    let chars = password.chars().count();
    if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&chars) {
        return Err(ValidationError::InvalidPassword(format!(
            "must be {MIN_PASSWORD_CHARS} to {MAX_PASSWORD_CHARS} characters"
        )));
    }

    Ok(())
}
