use std::sync::Arc;

use crate::{
    Error, Role, User,
    error::AuthError,
    password::{PasswordHasher, hash_password},
    repositories::UserRepository,
    user::NewUser,
    validation::{normalize_email, validate_email, validate_password},
};

/// Creates accounts.
///
/// Creation is a single INSERT, so there is nothing to roll back: either the row exists
/// afterwards or the call failed.
pub struct RegistrationService<U: UserRepository, H: PasswordHasher> {
    user_repository: Arc<U>,
    hasher: Arc<H>,
}

impl<U: UserRepository, H: PasswordHasher> RegistrationService<U, H> {
    pub fn new(user_repository: Arc<U>, hasher: Arc<H>) -> Self {
        Self {
            user_repository,
            hasher,
        }
    }

    pub async fn register(&self, email: &str, password: &str, role: Role) -> Result<User, Error> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;

        // Cheap pre-check; the unique index still decides races.
        if self.user_repository.exists_by_email(&email).await? {
            return Err(AuthError::DuplicateEmail.into());
        }

        let password_hash = hash_password(&self.hasher, password).await?;
        let user = self
            .user_repository
            .create(NewUser::new(email, password_hash).with_role(role))
            .await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        password::test_hasher,
        services::test_support::MockUserRepository,
    };

    fn service() -> (
        Arc<MockUserRepository>,
        RegistrationService<MockUserRepository, crate::password::Argon2Hasher>,
    ) {
        let users = Arc::new(MockUserRepository::default());
        let service = RegistrationService::new(users.clone(), Arc::new(test_hasher()));
        (users, service)
    }

    #[tokio::test]
    async fn test_register_normalizes_and_hashes() {
        let (users, service) = service();
        let user = service
            .register("  Alice@Example.com", "password123", Role::Client)
            .await
            .unwrap();

        assert_eq!(user.email, "alice@example.com");
        assert!(!user.is_email_verified());

        let hash = users.get_password_hash(&user.id).await.unwrap().unwrap();
        assert_ne!(hash, "password123");
        assert!(hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_duplicate_email_case_insensitive() {
        let (users, service) = service();
        let first = service
            .register("a@x.com", "password123", Role::Client)
            .await
            .unwrap();

        let err = service
            .register("A@X.COM", "password456", Role::StudioOwner)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateEmail);

        let stored = users.find_by_id(&first.id).await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Client);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let (_, service) = service();
        let err = service
            .register("not-an-email", "password123", Role::Client)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service
            .register("a@x.com", "short", Role::Client)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
