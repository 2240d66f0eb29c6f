//! Credential and session core for turnstile
//!
//! This crate holds everything that decides whether someone gets a session: the credential
//! store contract, password hashing, account lockout, the email verification gate, login,
//! refresh token rotation with reuse detection, and logout.
//!
//! It does not talk to a database directly. Storage backends implement the traits in
//! [`repositories`] (see `turnstile-storage-sqlite` and `turnstile-storage-postgres`), and the
//! `turnstile` crate wires everything together behind one facade.
//!
//! Failures surface as [`Error`]; use [`Error::kind`] to map them to a response without
//! matching on the nested enums.
pub mod config;
pub mod crypto;
pub mod error;
pub mod id;
pub mod mailer;
pub mod password;
pub mod repositories;
pub mod services;
pub mod signer;
pub mod storage;
pub mod user;
pub mod validation;

pub use config::AuthConfig;
pub use error::{Error, ErrorKind};
pub use mailer::{TracingMailer, VerificationMailer};
pub use password::{Argon2Hasher, PasswordHasher};
pub use repositories::RepositoryProvider;
pub use signer::{AccessClaims, AccessTokenSigner, JwtConfig, JwtSigner};
pub use storage::{ClientContext, FamilyId, RefreshTokenRecord, VerificationCode};
pub use user::{NewUser, Role, User, UserId};
