//! Repository traits for data access layer
//!
//! Services only ever talk to storage through these traits.
//!
//! # Trait Hierarchy
//!
//! - Individual `*Repository` traits define the operations for each data domain
//! - Individual `*RepositoryProvider` traits provide access to each repository type
//! - [`RepositoryProvider`] is a supertrait combining all provider traits plus lifecycle methods

pub mod adapter;
pub mod refresh_token;
pub mod user;
pub mod verification;

pub use adapter::{
    RefreshTokenRepositoryAdapter, UserRepositoryAdapter, VerificationCodeRepositoryAdapter,
};
pub use refresh_token::{RefreshTokenRepository, RefreshTokenTransaction};
pub use user::UserRepository;
pub use verification::VerificationCodeRepository;

use async_trait::async_trait;

use crate::Error;

/// Provider trait for user repository access.
pub trait UserRepositoryProvider: Send + Sync + 'static {
    type UserRepo: UserRepository;

    fn user(&self) -> &Self::UserRepo;
}

/// Provider trait for refresh token repository access.
pub trait RefreshTokenRepositoryProvider: Send + Sync + 'static {
    type RefreshTokenRepo: RefreshTokenRepository;

    fn refresh_token(&self) -> &Self::RefreshTokenRepo;
}

/// Provider trait for verification code repository access.
pub trait VerificationCodeRepositoryProvider: Send + Sync + 'static {
    type VerificationCodeRepo: VerificationCodeRepository;

    fn verification_code(&self) -> &Self::VerificationCodeRepo;
}

/// Provider trait that storage implementations must implement to provide all repositories.
///
/// # Implementing a Custom Storage Backend
///
/// 1. Implement each individual `*Repository` trait for your backend
/// 2. Implement each individual `*RepositoryProvider` trait
/// 3. Implement the `RepositoryProvider` trait with `migrate()` and `health_check()`
///
/// ```rust,ignore
/// use turnstile_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl UserRepositoryProvider for MyStorage {
///     type UserRepo = MyUserRepository;
///     fn user(&self) -> &Self::UserRepo { &self.user_repo }
/// }
///
/// // ... implement other provider traits ...
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider:
    UserRepositoryProvider + RefreshTokenRepositoryProvider + VerificationCodeRepositoryProvider
{
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
