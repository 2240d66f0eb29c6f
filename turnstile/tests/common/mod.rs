#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use turnstile::{
    Argon2Hasher, AuthConfig, ClientContext, Error, JwtConfig, JwtSigner, PasswordHashConfig,
    Pepper, RepositoryProvider, Turnstile, User, VerificationMailer,
};

pub const PASSWORD: &str = "correct horse battery";

/// Keeps every code it is asked to send so tests can read them back.
#[derive(Clone, Default)]
pub struct CapturingMailer {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl CapturingMailer {
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl VerificationMailer for CapturingMailer {
    async fn send_verification_code(&self, email: &str, code: &str) -> Result<(), Error> {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), code.to_string()));
        Ok(())
    }
}

pub type TestTurnstile<R> = Turnstile<R, JwtSigner, Argon2Hasher, CapturingMailer>;

/// Default policy with cheap hashing so the suite stays fast.
pub fn test_config() -> AuthConfig {
    AuthConfig::new(Pepper::new(vec![42u8; 32]).unwrap()).with_password_hash(PasswordHashConfig {
        memory_cost_kib: 8,
        time_cost: 1,
        parallelism: 1,
    })
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("turnstile=debug")
        .with_test_writer()
        .try_init();
}

pub fn build<R: RepositoryProvider>(
    repositories: Arc<R>,
    config: AuthConfig,
) -> (TestTurnstile<R>, CapturingMailer) {
    init_tracing();
    let mailer = CapturingMailer::default();
    let signer = JwtSigner::new(JwtConfig::new_hs256(
        b"integration-test-signing-key-0123456789".to_vec(),
    ))
    .unwrap();
    let hasher = Argon2Hasher::new(&config.password_hash).unwrap();
    let turnstile = Turnstile::with_components(repositories, signer, hasher, mailer.clone(), config);
    (turnstile, mailer)
}

/// Register `email` and confirm it with the code that registration mailed.
pub async fn verified_user<R: RepositoryProvider>(
    turnstile: &TestTurnstile<R>,
    mailer: &CapturingMailer,
    email: &str,
) -> User {
    turnstile.register(email, PASSWORD).await.unwrap();
    let code = mailer.last_code_for(email).unwrap();
    turnstile.confirm_email(email, &code).await.unwrap()
}

pub fn browser() -> ClientContext {
    ClientContext::new(
        Some("Mozilla/5.0".to_string()),
        Some("203.0.113.7".to_string()),
    )
}
