//! Outbound mail seam
//!
//! Template rendering and SMTP delivery live outside this system; the
//! services only hand over the recipient and the one-time token. The
//! default implementation records the send through tracing, which is also
//! what dev deployments run with.

use async_trait::async_trait;
use tracing::info;

use crate::types::Result;

/// Delivery boundary for account emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver the email-verification token to a freshly registered user.
    async fn send_verification(&self, to: &str, nombre: &str, token: &str) -> Result<()>;

    /// Deliver a password-reset token.
    async fn send_password_reset(&self, to: &str, nombre: &str, token: &str) -> Result<()>;
}

/// Mailer that logs instead of delivering.
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send_verification(&self, to: &str, nombre: &str, token: &str) -> Result<()> {
        info!(
            recipient = %to,
            nombre = %nombre,
            token_prefix = &token[..token.len().min(8)],
            "verification email queued"
        );
        Ok(())
    }

    async fn send_password_reset(&self, to: &str, nombre: &str, token: &str) -> Result<()> {
        info!(
            recipient = %to,
            nombre = %nombre,
            token_prefix = &token[..token.len().min(8)],
            "password reset email queued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_mailer_never_fails() {
        let mailer = TracingMailer;
        tokio_test::block_on(async {
            assert!(mailer
                .send_verification("ana@uni.edu", "Ana", "token-1234abcd")
                .await
                .is_ok());
            assert!(mailer
                .send_password_reset("ana@uni.edu", "Ana", "tok")
                .await
                .is_ok());
        });
    }
}
