use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson;
use validator::Validate;

pub const BOOKS_COLLECTION: &str = "books";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub library_id: ObjectId,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default)]
    pub read_count: i64,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[serde(default)]
    pub category: String,
    pub isbn: Option<String>,
    #[serde(default)]
    pub description: String,
    #[validate(url(message = "Content URL must be a valid URL"))]
    pub content_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Author cannot be empty"))]
    pub author: Option<String>,
    pub category: Option<String>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    #[validate(url(message = "Content URL must be a valid URL"))]
    pub content_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BookQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub id: String,
    pub library_id: String,
    pub title: String,
    pub author: String,
    pub category: String,
    pub isbn: Option<String>,
    pub description: String,
    pub content_url: Option<String>,
    pub read_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        BookResponse {
            id: book.id.map(|id| id.to_hex()).unwrap_or_default(),
            library_id: book.library_id.to_hex(),
            title: book.title,
            author: book.author,
            category: book.category,
            isbn: book.isbn,
            description: book.description,
            content_url: book.content_url,
            read_count: book.read_count,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}
