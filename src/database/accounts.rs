use async_trait::async_trait;
use chrono::Utc;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    Collection, Database,
};

use crate::errors::Result;
use crate::models::user::{User, USERS_COLLECTION};
use crate::services::reset_service::AccountStore;

#[derive(Clone)]
pub struct MongoAccountStore {
    users: Collection<User>,
}

impl MongoAccountStore {
    pub fn new(db: &Database) -> Self {
        Self {
            users: db.collection(USERS_COLLECTION),
        }
    }
}

#[async_trait]
impl AccountStore for MongoAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users.find_one(doc! { "email": email }).await?)
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> Result<bool> {
        let now = BsonDateTime::from_millis(Utc::now().timestamp_millis());
        let result = self
            .users
            .update_one(
                doc! { "email": email },
                doc! { "$set": { "password_hash": password_hash, "updated_at": now } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}
