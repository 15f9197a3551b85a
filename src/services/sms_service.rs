use async_trait::async_trait;
use reqwest::Client;

use crate::config::SmsConfig;
use crate::errors::{AppError, Result};
use crate::services::mailer::MessageSender;

/// SMS gateway client (Africa's Talking style form API).
#[derive(Clone)]
pub struct SmsService {
    api_url: String,
    api_key: String,
    username: String,
    from: String,
    client: Client,
}

impl SmsService {
    pub fn new(config: &SmsConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            username: config.username.clone(),
            from: config.from.clone(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl MessageSender for SmsService {
    // SMS has no subject line; only the body is sent.
    async fn send(&self, to: &str, _subject: &str, body: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.api_url)
            .header("apiKey", &self.api_key)
            .header("Accept", "application/json")
            .form(&[
                ("username", self.username.as_str()),
                ("to", to),
                ("message", body),
                ("from", self.from.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("SMS API error: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::ExternalApi(format!(
                "SMS sending failed with status: {}",
                response.status()
            )))
        }
    }

    fn transport_name(&self) -> &'static str {
        "sms"
    }
}
