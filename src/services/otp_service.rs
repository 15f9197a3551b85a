use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::{rngs::OsRng, Rng};

use crate::errors::{AppError, OtpError, Result};
use crate::models::otp::{constant_time_eq, normalize_identifier, OtpCheck, OtpEntry};
use crate::services::mailer::MessageSender;
use crate::services::otp_store::OtpStore;

pub const OTP_LENGTH: usize = 4;

#[derive(Debug, Clone)]
pub struct OtpSettings {
    pub ttl: Duration,
    pub max_attempts: u32,
    /// Code accepted for any identifier. Only for demo deployments.
    pub demo_code: Option<String>,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(5),
            max_attempts: 3,
            demo_code: None,
        }
    }
}

/// Issues and verifies short numeric codes for email/phone ownership checks.
///
/// Lifecycle per identifier: issued, then verified, expired, or exhausted
/// after `max_attempts` wrong guesses. Issuing again overwrites the pending
/// code and resets the attempt counter.
#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn OtpStore>,
    email: Arc<dyn MessageSender>,
    sms: Option<Arc<dyn MessageSender>>,
    settings: OtpSettings,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn OtpStore>,
        email: Arc<dyn MessageSender>,
        sms: Option<Arc<dyn MessageSender>>,
        settings: OtpSettings,
    ) -> Self {
        if settings.demo_code.is_some() {
            tracing::warn!("⚠️ OTP demo bypass code is enabled; do not use this in production");
        }
        Self {
            store,
            email,
            sms,
            settings,
        }
    }

    /// Random 4-digit code from the OS RNG, zero padded.
    pub fn generate() -> String {
        format!("{:0width$}", OsRng.gen_range(0..10_000u32), width = OTP_LENGTH)
    }

    /// Generates a fresh code for `identifier` and sends it.
    pub async fn issue_new(&self, identifier: &str) -> Result<()> {
        let code = Self::generate();
        self.issue(identifier, &code).await
    }

    /// Stores `code` for `identifier` (replacing any pending code) and
    /// dispatches it by email or SMS.
    pub async fn issue(&self, identifier: &str, code: &str) -> Result<()> {
        let key = normalize_identifier(identifier);
        let entry = OtpEntry::new(code, Utc::now() + self.settings.ttl);
        self.store.put(&key, entry).await?;

        tracing::info!("🔐 OTP issued for {}", key);
        self.dispatch(&key, code).await
    }

    pub async fn verify(&self, identifier: &str, submitted: &str) -> Result<()> {
        if let Some(demo) = &self.settings.demo_code {
            if constant_time_eq(demo.as_bytes(), submitted.as_bytes()) {
                tracing::warn!("OTP demo bypass used for {}", identifier);
                return Ok(());
            }
        }

        let key = normalize_identifier(identifier);
        let outcome = self
            .store
            .consume(&key, submitted, Utc::now(), self.settings.max_attempts)
            .await?;

        match outcome {
            OtpCheck::Verified => {
                tracing::info!("✅ OTP verified for {}", key);
                Ok(())
            }
            OtpCheck::NotFound => Err(OtpError::NotFound.into()),
            OtpCheck::Expired => Err(OtpError::Expired.into()),
            OtpCheck::TooManyAttempts => Err(OtpError::TooManyAttempts.into()),
            OtpCheck::Mismatch { attempts } => {
                let remaining = self.settings.max_attempts.saturating_sub(attempts);
                if remaining == 0 {
                    tracing::warn!("OTP attempts exhausted for {}", key);
                }
                Err(OtpError::InvalidCode { remaining }.into())
            }
        }
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend_name()
    }

    async fn dispatch(&self, key: &str, code: &str) -> Result<()> {
        let minutes = self.settings.ttl.num_minutes().max(1);
        let subject = "Your LibraryMate verification code";
        let body = format!(
            "Your LibraryMate verification code is {}. It expires in {} minutes.",
            code, minutes
        );

        if key.contains('@') {
            return self.email.send(key, subject, &body).await;
        }

        match &self.sms {
            Some(sms) => sms.send(key, subject, &body).await,
            None => Err(AppError::ServiceUnavailable(
                "SMS delivery is not configured".to_string(),
            )),
        }
    }
}
