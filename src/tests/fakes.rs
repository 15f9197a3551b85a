use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::errors::{AppError, Result};
use crate::models::password_reset::PasswordResetEntry;
use crate::models::user::User;
use crate::services::mailer::MessageSender;
use crate::services::reset_service::{AccountStore, ResetTokenStore};

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Keeps every message instead of delivering it.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
    fail: bool,
}

impl RecordingSender {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.fail {
            return Err(AppError::EmailSend("connection refused".to_string()));
        }
        self.sent.lock().await.push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "recording"
    }
}

#[derive(Default)]
pub struct MemoryAccountStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryAccountStore {
    pub async fn insert(&self, user: User) {
        self.users.lock().await.insert(user.email.clone(), user);
    }

    pub async fn get(&self, email: &str) -> Option<User> {
        self.users.lock().await.get(email).cloned()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.get(email).await)
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> Result<bool> {
        let mut users = self.users.lock().await;
        match users.get_mut(email) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryResetTokenStore {
    by_email: Mutex<HashMap<String, PasswordResetEntry>>,
}

impl MemoryResetTokenStore {
    pub async fn len(&self) -> usize {
        self.by_email.lock().await.len()
    }
}

#[async_trait]
impl ResetTokenStore for MemoryResetTokenStore {
    async fn upsert(&self, entry: PasswordResetEntry) -> Result<()> {
        self.by_email.lock().await.insert(entry.email.clone(), entry);
        Ok(())
    }

    async fn claim(&self, token: &str, now: DateTime<Utc>) -> Result<Option<PasswordResetEntry>> {
        let mut rows = self.by_email.lock().await;
        let claimed = rows
            .values_mut()
            .find(|entry| entry.token == token && entry.is_usable_at(now))
            .map(|entry| {
                entry.used = true;
                entry.clone()
            });
        Ok(claimed)
    }
}
