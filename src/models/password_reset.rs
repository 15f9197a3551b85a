use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson;

pub const PASSWORD_RESETS_COLLECTION: &str = "password_resets";

/// One reset token per email; a new request overwrites the previous row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetEntry {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub token: String,
    pub used: bool,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl PasswordResetEntry {
    pub fn new(email: impl Into<String>, token: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            email: email.into(),
            token: token.into(),
            used: false,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_new_entry_is_usable() {
        let entry = PasswordResetEntry::new("a@b.com", "token", Duration::hours(1));
        assert!(entry.is_usable_at(Utc::now()));
        assert!(!entry.used);
    }

    #[rstest]
    fn test_expired_entry() {
        let entry = PasswordResetEntry::new("a@b.com", "token", Duration::seconds(-1));
        assert!(entry.is_expired_at(Utc::now()));
        assert!(!entry.is_usable_at(Utc::now()));
    }

    #[rstest]
    fn test_used_entry() {
        let mut entry = PasswordResetEntry::new("a@b.com", "token", Duration::hours(1));
        entry.used = true;
        assert!(!entry.is_usable_at(Utc::now()));
    }
}
