use async_trait::async_trait;

use crate::Error;

/// Delivery of verification codes to the address being verified.
#[async_trait]
pub trait VerificationMailer: Send + Sync + 'static {
    async fn send_verification_code(&self, email: &str, code: &str) -> Result<(), Error>;
}

/// Development mailer that writes codes to the tracing log instead of sending them.
///
/// The code is only logged at `debug`; never enable this mailer in production.
#[derive(Debug, Clone, Default)]
pub struct TracingMailer;

#[async_trait]
impl VerificationMailer for TracingMailer {
    async fn send_verification_code(&self, email: &str, code: &str) -> Result<(), Error> {
        tracing::info!(email = %email, "Verification code issued");
        tracing::debug!(email = %email, code = %code, "Verification code contents");
        Ok(())
    }
}
