use std::sync::Arc;

use chrono::Duration;
use mongodb::Database;

use crate::config::{AppConfig, MailTransportKind, OtpStoreKind};
use crate::database::{accounts::MongoAccountStore, reset_tokens::MongoResetTokenStore};
use crate::errors::{AppError, Result};
use crate::services::{
    mailer::{LocalMailer, MessageSender, SmtpMailer},
    otp_service::{OtpService, OtpSettings},
    otp_store::{MemoryOtpStore, OtpStore, RedisOtpStore},
    password::PasswordHasher,
    reset_service::PasswordResetService,
    sms_service::SmsService,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<AppConfig>,
    pub otp: OtpService,
    pub resets: PasswordResetService,
    pub hasher: PasswordHasher,
    pub mailer: Arc<dyn MessageSender>,
}

impl AppState {
    pub fn new(
        db: Database,
        config: AppConfig,
        otp_store: Arc<dyn OtpStore>,
        mailer: Arc<dyn MessageSender>,
        sms: Option<Arc<dyn MessageSender>>,
        hasher: PasswordHasher,
    ) -> Self {
        let otp = OtpService::new(
            otp_store,
            mailer.clone(),
            sms,
            OtpSettings {
                ttl: Duration::seconds(config.otp_ttl_seconds),
                max_attempts: config.otp_max_attempts,
                demo_code: config.otp_demo_code.clone(),
            },
        );
        let resets = PasswordResetService::new(
            Arc::new(MongoAccountStore::new(&db)),
            Arc::new(MongoResetTokenStore::new(&db)),
            mailer.clone(),
            hasher,
            Duration::seconds(config.reset_token_ttl_seconds),
            config.frontend_url.clone(),
        );

        AppState {
            db,
            config: Arc::new(config),
            otp,
            resets,
            hasher,
            mailer,
        }
    }

    /// Wires the OTP store, mail transport and SMS gateway named in `config`.
    pub async fn from_config(db: Database, config: AppConfig) -> Result<Self> {
        let otp_store: Arc<dyn OtpStore> = match config.otp_store {
            OtpStoreKind::Memory => {
                tracing::warn!("OTP store is in-memory; pending codes are lost on restart");
                let store = Arc::new(MemoryOtpStore::new());
                let sweeper = store.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
                    loop {
                        interval.tick().await;
                        let purged = sweeper.purge_expired(chrono::Utc::now()).await;
                        if purged > 0 {
                            tracing::debug!("🧹 Purged {} expired OTP(s)", purged);
                        }
                    }
                });
                store
            }
            OtpStoreKind::Redis => {
                let url = config
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| AppError::configuration("REDIS_URL must be set"))?;
                Arc::new(RedisOtpStore::connect(url).await?)
            }
        };

        let mailer: Arc<dyn MessageSender> = match (&config.mail_transport, &config.smtp) {
            (MailTransportKind::Smtp, Some(smtp)) => {
                Arc::new(SmtpMailer::new(smtp, config.mail_from.clone())?)
            }
            (MailTransportKind::Smtp, None) => {
                return Err(AppError::configuration("SMTP_HOST must be set"))
            }
            (MailTransportKind::Local, _) => {
                tracing::info!(
                    "📭 Mail goes to the local outbox at {}",
                    config.mail_outbox_dir.display()
                );
                Arc::new(LocalMailer::new(config.mail_outbox_dir.clone()))
            }
        };

        let sms: Option<Arc<dyn MessageSender>> = match &config.sms {
            Some(sms) => Some(Arc::new(SmsService::new(sms))),
            None => {
                tracing::warn!("SMS gateway not configured; phone OTPs are disabled");
                None
            }
        };

        tracing::info!(
            "✅ OTP store: {}, mail transport: {}",
            otp_store.backend_name(),
            mailer.transport_name()
        );

        Ok(Self::new(db, config, otp_store, mailer, sms, PasswordHasher::default()))
    }
}
