//! Service layer for business logic
//!
//! Each service is generic over the repository traits it needs and holds them behind `Arc`,
//! so one storage backend can be shared by all of them.

pub mod account;
pub mod lockout;
pub mod registration;
pub mod rotation;
pub mod session;
pub mod verification;

#[cfg(test)]
pub(crate) mod test_support;

pub use account::AccountService;
pub use lockout::{LockoutPolicy, LockoutStatus, LockoutUpdate};
pub use registration::RegistrationService;
pub use rotation::{RefreshRotator, TokenPair};
pub use session::{LoginOutcome, SessionIssuer};
pub use verification::EmailVerificationService;
