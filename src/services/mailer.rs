use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use lettre::{
    message::Mailbox,
    transport::smtp::{authentication::Credentials, AsyncSmtpTransport},
    AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::errors::{AppError, Result};

/// Delivers a short text message to an address (email or phone number).
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;

    /// Short name reported by the health endpoint.
    fn transport_name(&self) -> &'static str;
}

#[derive(Clone)]
pub struct SmtpMailer {
    from: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, from: impl Into<String>) -> Result<Self> {
        let mut transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::configuration(format!("Invalid SMTP host: {}", e)))?
            .port(config.port);
        if !config.username.is_empty() {
            transport = transport.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }
        Ok(Self {
            from: from.into(),
            mailer: transport.build(),
        })
    }
}

#[async_trait]
impl MessageSender for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|_| AppError::EmailSend("Invalid FROM email address".to_string()))?;
        let to: Mailbox = to
            .parse()
            .map_err(|_| AppError::EmailSend("Invalid TO email address".to_string()))?;
        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|err| AppError::EmailSend(err.to_string()))?;
        self.mailer
            .send(message)
            .await
            .map_err(|err| AppError::EmailSend(err.to_string()))?;
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "smtp"
    }
}

/// Disposable inbox: every message becomes a `.txt` file in `output_dir`.
#[derive(Clone)]
pub struct LocalMailer {
    output_dir: PathBuf,
}

impl LocalMailer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl MessageSender for LocalMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|err| AppError::EmailSend(err.to_string()))?;
        let file_name = format!(
            "{}_{}.txt",
            Utc::now().format("%Y%m%d%H%M%S"),
            Uuid::new_v4().simple()
        );
        let message = format!("To: {to}\nSubject: {subject}\n\n{body}\n");
        tokio::fs::write(self.output_dir.join(file_name), message)
            .await
            .map_err(|err| AppError::EmailSend(err.to_string()))?;
        tracing::info!("📭 Message for {} written to local outbox", to);
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_local_mailer_writes_file() {
        let dir = PathBuf::from("./tmp/test-local-mailer");
        if dir.exists() {
            fs::remove_dir_all(&dir).expect("cleanup test directory");
        }
        let mailer = LocalMailer::new(&dir);
        mailer
            .send("reader@example.com", "Your LibraryMate code", "Code: 4821")
            .await
            .expect("send locally");

        let mut entries = fs::read_dir(&dir).expect("read output dir");
        let first = entries
            .next()
            .expect("one file expected")
            .expect("valid dir entry");
        let text = fs::read_to_string(first.path()).expect("read email file");

        assert!(text.contains("To: reader@example.com"));
        assert!(text.contains("Subject: Your LibraryMate code"));
        assert!(text.contains("Code: 4821"));

        fs::remove_dir_all(&dir).expect("cleanup test directory");
    }

    #[tokio::test]
    async fn test_smtp_mailer_builds_without_connecting() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        let mailer = SmtpMailer::new(&config, "LibraryMate <no-reply@example.com>").unwrap();
        assert_eq!(mailer.transport_name(), "smtp");
    }
}
