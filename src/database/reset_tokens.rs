use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{self, doc, DateTime as BsonDateTime},
    options::ReturnDocument,
    Collection, Database,
};

use crate::errors::{AppError, Result};
use crate::models::password_reset::{PasswordResetEntry, PASSWORD_RESETS_COLLECTION};
use crate::services::reset_service::ResetTokenStore;

#[derive(Clone)]
pub struct MongoResetTokenStore {
    resets: Collection<PasswordResetEntry>,
}

impl MongoResetTokenStore {
    pub fn new(db: &Database) -> Self {
        Self {
            resets: db.collection(PASSWORD_RESETS_COLLECTION),
        }
    }
}

#[async_trait]
impl ResetTokenStore for MongoResetTokenStore {
    async fn upsert(&self, entry: PasswordResetEntry) -> Result<()> {
        let replacement = bson::to_document(&entry)
            .map_err(|e| AppError::internal(format!("BSON conversion failed: {}", e)))?;
        self.resets
            .update_one(doc! { "email": &entry.email }, doc! { "$set": replacement })
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn claim(&self, token: &str, now: DateTime<Utc>) -> Result<Option<PasswordResetEntry>> {
        let now = BsonDateTime::from_millis(now.timestamp_millis());
        // The filter and the update run as one atomic document operation.
        let claimed = self
            .resets
            .find_one_and_update(
                doc! { "token": token, "used": false, "expires_at": { "$gte": now } },
                doc! { "$set": { "used": true } },
            )
            .return_document(ReturnDocument::After)
            .await?;
        Ok(claimed)
    }
}
