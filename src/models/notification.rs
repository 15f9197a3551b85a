use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson;
use validator::Validate;

pub const NOTIFICATIONS_COLLECTION: &str = "notifications";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub library_id: ObjectId,
    // None means every student of the library receives it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<ObjectId>,
    pub title: String,
    pub message: String,
    pub created_by: ObjectId,
    #[serde(default)]
    pub read_by: Vec<ObjectId>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendNotificationRequest {
    #[validate(length(equal = 24, message = "Invalid library id"))]
    pub library_id: String,
    pub recipient_id: Option<String>,
    #[validate(length(min = 1, max = 120, message = "Title must be 1-120 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 2000, message = "Message must be 1-2000 characters"))]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub page: Option<u64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: String,
    pub library_id: String,
    pub recipient_id: Option<String>,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationResponse {
    /// Read state is per viewer because broadcasts are shared documents.
    pub fn for_viewer(notification: Notification, viewer: &ObjectId) -> Self {
        NotificationResponse {
            id: notification.id.map(|id| id.to_hex()).unwrap_or_default(),
            library_id: notification.library_id.to_hex(),
            recipient_id: notification.recipient_id.map(|id| id.to_hex()),
            is_read: notification.read_by.contains(viewer),
            title: notification.title,
            message: notification.message,
            created_at: notification.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_state_is_per_viewer() {
        let reader = ObjectId::new();
        let other = ObjectId::new();
        let notification = Notification {
            id: Some(ObjectId::new()),
            library_id: ObjectId::new(),
            recipient_id: None,
            title: "Closed on Friday".into(),
            message: "The reading room is closed for maintenance.".into(),
            created_by: ObjectId::new(),
            read_by: vec![reader],
            created_at: Utc::now(),
        };

        assert!(NotificationResponse::for_viewer(notification.clone(), &reader).is_read);
        assert!(!NotificationResponse::for_viewer(notification, &other).is_read);
    }
}
