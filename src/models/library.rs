use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson;
use validator::Validate;

pub const LIBRARIES_COLLECTION: &str = "libraries";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub owner_id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLibrary {
    #[validate(length(min = 2, message = "Library name must be at least 2 characters"))]
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    // Only honoured for admins creating a library on behalf of an owner.
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLibrary {
    #[validate(length(min = 2, message = "Library name must be at least 2 characters"))]
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LibraryQuery {
    pub page: Option<u64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LibraryResponse {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Library> for LibraryResponse {
    fn from(library: Library) -> Self {
        LibraryResponse {
            id: library.id.map(|id| id.to_hex()).unwrap_or_default(),
            owner_id: library.owner_id.to_hex(),
            name: library.name,
            address: library.address,
            phone: library.phone,
            email: library.email,
            created_at: library.created_at,
            updated_at: library.updated_at,
        }
    }
}
