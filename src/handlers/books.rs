use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    options::ReturnDocument,
    Collection,
};
use validator::Validate;

use crate::dtos::response::{ApiResponse, Paginated, Pagination};
use crate::errors::{parse_object_id, AppError, Result};
use crate::handlers::access::{library_for_manager, library_for_member, search_filter};
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::{ApiJson, ApiQuery};
use crate::models::book::{Book, BookQuery, BookResponse, CreateBook, UpdateBook, BOOKS_COLLECTION};
use crate::state::AppState;

fn books(state: &AppState) -> Collection<Book> {
    state.db.collection(BOOKS_COLLECTION)
}

fn book_filter(library_id: ObjectId, book_id: ObjectId) -> Document {
    doc! { "_id": book_id, "library_id": library_id }
}

pub async fn list_books(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(library_id): Path<String>,
    ApiQuery(query): ApiQuery<BookQuery>,
) -> Result<Json<ApiResponse<Paginated<BookResponse>>>> {
    let library_id = parse_object_id(&library_id)?;
    library_for_member(&state, &auth, &library_id).await?;

    let mut filter = doc! { "library_id": library_id };
    if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
        filter.insert("category", category);
    }
    if let Some(search) = query.search.as_deref().and_then(|s| search_filter(s, &["title", "author"])) {
        filter.extend(search);
    }

    let page = Pagination::new(query.page, query.limit);
    let total = books(&state).count_documents(filter.clone()).await?;
    let cursor = books(&state)
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit)
        .await?;
    let items: Vec<Book> = cursor.try_collect().await?;

    Ok(Json(ApiResponse::ok(Paginated::new(
        items.into_iter().map(BookResponse::from).collect(),
        page,
        total,
    ))))
}

pub async fn create_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(library_id): Path<String>,
    ApiJson(payload): ApiJson<CreateBook>,
) -> Result<Json<ApiResponse<BookResponse>>> {
    payload.validate()?;
    let library_id = parse_object_id(&library_id)?;
    library_for_manager(&state, &auth, &library_id).await?;

    let now = Utc::now();
    let book = Book {
        id: Some(ObjectId::new()),
        library_id,
        title: payload.title.trim().to_string(),
        author: payload.author.trim().to_string(),
        category: payload.category.trim().to_string(),
        isbn: payload.isbn,
        description: payload.description,
        content_url: payload.content_url,
        read_count: 0,
        created_at: now,
        updated_at: now,
    };
    books(&state).insert_one(&book).await?;

    tracing::info!("📚 Book '{}' added to library {}", book.title, library_id);
    Ok(Json(ApiResponse::ok(BookResponse::from(book)).with_message("Book added")))
}

pub async fn get_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((library_id, book_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<BookResponse>>> {
    let library_id = parse_object_id(&library_id)?;
    let book_id = parse_object_id(&book_id)?;
    library_for_member(&state, &auth, &library_id).await?;

    let book = books(&state)
        .find_one(book_filter(library_id, book_id))
        .await?
        .ok_or_else(|| AppError::not_found("Book"))?;
    Ok(Json(ApiResponse::ok(BookResponse::from(book))))
}

pub async fn update_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((library_id, book_id)): Path<(String, String)>,
    ApiJson(payload): ApiJson<UpdateBook>,
) -> Result<Json<ApiResponse<BookResponse>>> {
    payload.validate()?;
    let library_id = parse_object_id(&library_id)?;
    let book_id = parse_object_id(&book_id)?;
    library_for_manager(&state, &auth, &library_id).await?;

    let mut set = Document::new();
    if let Some(title) = payload.title {
        set.insert("title", title.trim());
    }
    if let Some(author) = payload.author {
        set.insert("author", author.trim());
    }
    if let Some(category) = payload.category {
        set.insert("category", category.trim());
    }
    if let Some(isbn) = payload.isbn {
        set.insert("isbn", isbn);
    }
    if let Some(description) = payload.description {
        set.insert("description", description);
    }
    if let Some(content_url) = payload.content_url {
        set.insert("content_url", content_url);
    }
    set.insert("updated_at", BsonDateTime::from_millis(Utc::now().timestamp_millis()));

    let book = books(&state)
        .find_one_and_update(book_filter(library_id, book_id), doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Book"))?;

    Ok(Json(ApiResponse::ok(BookResponse::from(book)).with_message("Book updated")))
}

pub async fn delete_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((library_id, book_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<()>>> {
    let library_id = parse_object_id(&library_id)?;
    let book_id = parse_object_id(&book_id)?;
    library_for_manager(&state, &auth, &library_id).await?;

    let result = books(&state)
        .delete_one(book_filter(library_id, book_id))
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::not_found("Book"));
    }
    Ok(Json(ApiResponse::message("Book deleted")))
}

// Opening a book counts a read and hands back its content link
pub async fn read_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((library_id, book_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<BookResponse>>> {
    let library_id = parse_object_id(&library_id)?;
    let book_id = parse_object_id(&book_id)?;
    library_for_member(&state, &auth, &library_id).await?;

    let book = books(&state)
        .find_one_and_update(
            book_filter(library_id, book_id),
            doc! { "$inc": { "read_count": 1 } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Book"))?;

    if book.content_url.is_none() {
        tracing::warn!("Book {} has no content to read", book_id);
    }
    Ok(Json(ApiResponse::ok(BookResponse::from(book))))
}
