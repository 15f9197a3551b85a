use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};

use crate::errors::{AppError, ResetError, Result};
use crate::models::password_reset::PasswordResetEntry;
use crate::models::user::{normalize_email, User};
use crate::services::mailer::MessageSender;
use crate::services::password::PasswordHasher;

pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent";
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Returns `false` when no account has this email.
    async fn update_password(&self, email: &str, password_hash: &str) -> Result<bool>;
}

#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Inserts or replaces the reset row for `entry.email`.
    async fn upsert(&self, entry: PasswordResetEntry) -> Result<()>;

    /// Marks an unused, unexpired token as used and returns it. Two
    /// concurrent claims of the same token cannot both succeed.
    async fn claim(&self, token: &str, now: DateTime<Utc>) -> Result<Option<PasswordResetEntry>>;
}

#[derive(Clone)]
pub struct PasswordResetService {
    accounts: Arc<dyn AccountStore>,
    tokens: Arc<dyn ResetTokenStore>,
    mailer: Arc<dyn MessageSender>,
    hasher: PasswordHasher,
    ttl: Duration,
    frontend_url: String,
}

impl PasswordResetService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<dyn ResetTokenStore>,
        mailer: Arc<dyn MessageSender>,
        hasher: PasswordHasher,
        ttl: Duration,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            accounts,
            tokens,
            mailer,
            hasher,
            ttl,
            frontend_url: frontend_url.into(),
        }
    }

    /// 32 random bytes, base64url without padding.
    pub fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Starts a reset for `email`. The returned message is identical whether
    /// or not the account exists.
    pub async fn request(&self, email: &str) -> Result<&'static str> {
        let email = normalize_email(email);
        if self.accounts.find_by_email(&email).await?.is_none() {
            tracing::warn!("Password reset requested for unknown email");
            return Ok(RESET_REQUESTED_MESSAGE);
        }

        let token = Self::generate_token();
        self.tokens
            .upsert(PasswordResetEntry::new(email.clone(), token.clone(), self.ttl))
            .await?;

        let link = format!(
            "{}/reset-password?token={}",
            self.frontend_url.trim_end_matches('/'),
            token
        );
        let body = format!(
            "We received a request to reset your LibraryMate password.\n\n\
             Open this link within {} minutes to choose a new password:\n{}\n\n\
             If you did not ask for this, you can ignore this email.",
            self.ttl.num_minutes(),
            link
        );
        if let Err(e) = self
            .mailer
            .send(&email, "Reset your LibraryMate password", &body)
            .await
        {
            tracing::error!("Failed to send password reset email to {}: {}", email, e);
        } else {
            tracing::info!("📧 Password reset email sent to {}", email);
        }

        Ok(RESET_REQUESTED_MESSAGE)
    }

    pub async fn consume(&self, token: &str, new_password: &str) -> Result<()> {
        if new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::invalid_data(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let entry = self
            .tokens
            .claim(token, Utc::now())
            .await?
            .ok_or(AppError::Reset(ResetError::InvalidOrExpired))?;

        let password_hash = self.hasher.hash(new_password).await?;
        if !self.accounts.update_password(&entry.email, &password_hash).await? {
            tracing::error!("Reset token claimed for missing account {}", entry.email);
            return Err(ResetError::NotFound.into());
        }

        tracing::info!("🔑 Password reset completed for {}", entry.email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;
    use crate::tests::fakes::{MemoryAccountStore, MemoryResetTokenStore, RecordingSender};

    struct Fixture {
        service: PasswordResetService,
        accounts: Arc<MemoryAccountStore>,
        tokens: Arc<MemoryResetTokenStore>,
        mailer: Arc<RecordingSender>,
    }

    fn fixture(ttl: Duration) -> Fixture {
        let accounts = Arc::new(MemoryAccountStore::default());
        let tokens = Arc::new(MemoryResetTokenStore::default());
        let mailer = Arc::new(RecordingSender::default());
        let service = PasswordResetService::new(
            accounts.clone(),
            tokens.clone(),
            mailer.clone(),
            PasswordHasher::with_cost(4),
            ttl,
            "http://localhost:5173/",
        );
        Fixture {
            service,
            accounts,
            tokens,
            mailer,
        }
    }

    async fn seed_account(accounts: &MemoryAccountStore, email: &str) {
        let user = User::new("Asha".into(), email.into(), "old-hash".into(), Role::Owner);
        accounts.insert(user).await;
    }

    fn token_from_link(body: &str) -> String {
        body.split("token=")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .expect("reset link in body")
            .to_string()
    }

    #[tokio::test]
    async fn test_request_for_unknown_email_is_generic_and_silent() {
        let f = fixture(Duration::hours(1));
        let message = f.service.request("ghost@example.com").await.unwrap();
        assert_eq!(message, RESET_REQUESTED_MESSAGE);
        assert!(f.mailer.sent().await.is_empty());
        assert_eq!(f.tokens.len().await, 0);
    }

    #[tokio::test]
    async fn test_request_sends_link_and_consume_updates_password() {
        let f = fixture(Duration::hours(1));
        seed_account(&f.accounts, "asha@example.com").await;

        let message = f.service.request("Asha@Example.com").await.unwrap();
        assert_eq!(message, RESET_REQUESTED_MESSAGE);

        let sent = f.mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "asha@example.com");
        assert!(sent[0].body.contains("http://localhost:5173/reset-password?token="));

        let token = token_from_link(&sent[0].body);
        f.service.consume(&token, "brand-new-pass").await.unwrap();

        let user = f.accounts.get("asha@example.com").await.unwrap();
        assert!(bcrypt::verify("brand-new-pass", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_token_cannot_be_reused() {
        let f = fixture(Duration::hours(1));
        seed_account(&f.accounts, "asha@example.com").await;
        f.service.request("asha@example.com").await.unwrap();
        let token = token_from_link(&f.mailer.sent().await[0].body);

        f.service.consume(&token, "first-password").await.unwrap();
        let second = f.service.consume(&token, "second-password").await;
        assert!(matches!(second, Err(AppError::Reset(ResetError::InvalidOrExpired))));
    }

    #[tokio::test]
    async fn test_new_request_overwrites_old_token() {
        let f = fixture(Duration::hours(1));
        seed_account(&f.accounts, "asha@example.com").await;
        f.service.request("asha@example.com").await.unwrap();
        f.service.request("asha@example.com").await.unwrap();

        let sent = f.mailer.sent().await;
        let old = token_from_link(&sent[0].body);
        let new = token_from_link(&sent[1].body);
        assert_ne!(old, new);
        assert_eq!(f.tokens.len().await, 1);

        assert!(matches!(
            f.service.consume(&old, "password-1").await,
            Err(AppError::Reset(ResetError::InvalidOrExpired))
        ));
        f.service.consume(&new, "password-2").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let f = fixture(Duration::seconds(-1));
        seed_account(&f.accounts, "asha@example.com").await;
        f.service.request("asha@example.com").await.unwrap();
        let token = token_from_link(&f.mailer.sent().await[0].body);

        assert!(matches!(
            f.service.consume(&token, "password-1").await,
            Err(AppError::Reset(ResetError::InvalidOrExpired))
        ));
    }

    #[tokio::test]
    async fn test_short_password_is_rejected_before_token_is_spent() {
        let f = fixture(Duration::hours(1));
        seed_account(&f.accounts, "asha@example.com").await;
        f.service.request("asha@example.com").await.unwrap();
        let token = token_from_link(&f.mailer.sent().await[0].body);

        assert!(matches!(
            f.service.consume(&token, "123").await,
            Err(AppError::ValidationError(_))
        ));
        f.service.consume(&token, "long-enough").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_account_after_claim_is_not_found() {
        let f = fixture(Duration::hours(1));
        f.tokens
            .upsert(PasswordResetEntry::new("gone@example.com", "orphan", Duration::hours(1)))
            .await
            .unwrap();

        assert!(matches!(
            f.service.consume("orphan", "password-1").await,
            Err(AppError::Reset(ResetError::NotFound))
        ));
    }

    #[tokio::test]
    async fn test_mail_failure_still_returns_generic_message() {
        let accounts = Arc::new(MemoryAccountStore::default());
        seed_account(&accounts, "asha@example.com").await;
        let service = PasswordResetService::new(
            accounts,
            Arc::new(MemoryResetTokenStore::default()),
            Arc::new(RecordingSender::failing()),
            PasswordHasher::with_cost(4),
            Duration::hours(1),
            "http://localhost:5173",
        );
        assert_eq!(
            service.request("asha@example.com").await.unwrap(),
            RESET_REQUESTED_MESSAGE
        );
    }

    #[test]
    fn test_generated_tokens_are_unique_and_url_safe() {
        let a = PasswordResetService::generate_token();
        let b = PasswordResetService::generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
