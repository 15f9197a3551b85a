use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson;

use crate::models::role::Role;

pub const USERS_COLLECTION: &str = "users";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub password_hash: String,
    pub role: Role,

    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub phone_verified: bool,

    // Student accounts belong to exactly one library.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_number: Option<String>,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: String, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        User {
            id: Some(ObjectId::new()),
            name,
            email: normalize_email(&email),
            phone: None,
            password_hash,
            role,
            email_verified: false,
            phone_verified: false,
            library_id: None,
            seat_number: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Emails are stored and looked up trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[derive(Debug, Serialize, Clone)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub library_id: Option<String>,
    pub seat_number: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            role: user.role,
            email_verified: user.email_verified,
            phone_verified: user.phone_verified,
            library_id: user.library_id.map(|id| id.to_hex()),
            seat_number: user.seat_number,
            active: user.active,
            created_at: user.created_at,
        }
    }
}

/// JWT payload: `{id, role, exp}`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub id: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}
