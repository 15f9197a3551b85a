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
use crate::handlers::access::{
    ensure_no_students, find_user, library_for_manager, library_for_member,
};
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::{ApiJson, ApiQuery};
use crate::models::{
    book::BOOKS_COLLECTION,
    library::{
        CreateLibrary, Library, LibraryQuery, LibraryResponse, UpdateLibrary, LIBRARIES_COLLECTION,
    },
    notification::NOTIFICATIONS_COLLECTION,
    role::Role,
    user::USERS_COLLECTION,
};
use crate::state::AppState;

fn libraries(state: &AppState) -> Collection<Library> {
    state.db.collection(LIBRARIES_COLLECTION)
}

// Owners see their own libraries, admins see all of them
pub async fn list_libraries(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<LibraryQuery>,
) -> Result<Json<ApiResponse<Paginated<LibraryResponse>>>> {
    auth.require_manager()?;

    let filter = if auth.is_admin() {
        doc! {}
    } else {
        doc! { "owner_id": auth.id }
    };

    let page = Pagination::new(query.page, query.limit);
    let total = libraries(&state).count_documents(filter.clone()).await?;
    let cursor = libraries(&state)
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit)
        .await?;
    let items: Vec<Library> = cursor.try_collect().await?;

    tracing::info!("✅ Fetched {} libraries for {}", items.len(), auth.id);
    Ok(Json(ApiResponse::ok(Paginated::new(
        items.into_iter().map(LibraryResponse::from).collect(),
        page,
        total,
    ))))
}

pub async fn create_library(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<CreateLibrary>,
) -> Result<Json<ApiResponse<LibraryResponse>>> {
    auth.require_manager()?;
    payload.validate()?;

    let owner_id = match (&payload.owner_id, auth.is_admin()) {
        (Some(raw), true) => {
            let owner_id = parse_object_id(raw)?;
            let owner = find_user(&state, &owner_id).await?;
            if owner.role != Role::Owner {
                return Err(AppError::invalid_data("owner_id must refer to a library owner"));
            }
            owner_id
        }
        _ => auth.id,
    };

    let now = Utc::now();
    let library = Library {
        id: Some(ObjectId::new()),
        owner_id,
        name: payload.name.trim().to_string(),
        address: payload.address.trim().to_string(),
        phone: payload.phone,
        email: payload.email,
        created_at: now,
        updated_at: now,
    };
    libraries(&state).insert_one(&library).await?;

    tracing::info!("🏛️ Library '{}' created by {}", library.name, auth.id);
    Ok(Json(
        ApiResponse::ok(LibraryResponse::from(library)).with_message("Library created"),
    ))
}

pub async fn get_library(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<LibraryResponse>>> {
    let id = parse_object_id(&id)?;
    let library = library_for_member(&state, &auth, &id).await?;
    Ok(Json(ApiResponse::ok(LibraryResponse::from(library))))
}

pub async fn update_library(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateLibrary>,
) -> Result<Json<ApiResponse<LibraryResponse>>> {
    payload.validate()?;
    let id = parse_object_id(&id)?;
    library_for_manager(&state, &auth, &id).await?;

    let mut set = Document::new();
    if let Some(name) = payload.name {
        set.insert("name", name.trim());
    }
    if let Some(address) = payload.address {
        set.insert("address", address.trim());
    }
    if let Some(phone) = payload.phone {
        set.insert("phone", phone);
    }
    if let Some(email) = payload.email {
        set.insert("email", email);
    }
    set.insert("updated_at", BsonDateTime::from_millis(Utc::now().timestamp_millis()));

    let library = libraries(&state)
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Library"))?;

    Ok(Json(
        ApiResponse::ok(LibraryResponse::from(library)).with_message("Library updated"),
    ))
}

// A library with enrolled students cannot be deleted; books and
// notifications go with it.
pub async fn delete_library(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let id = parse_object_id(&id)?;
    library_for_manager(&state, &auth, &id).await?;

    let students = state
        .db
        .collection::<Document>(USERS_COLLECTION)
        .count_documents(doc! { "library_id": id, "role": Role::Student.as_str() })
        .await?;
    ensure_no_students(students)?;

    let books = state
        .db
        .collection::<Document>(BOOKS_COLLECTION)
        .delete_many(doc! { "library_id": id })
        .await?;
    state
        .db
        .collection::<Document>(NOTIFICATIONS_COLLECTION)
        .delete_many(doc! { "library_id": id })
        .await?;
    libraries(&state).delete_one(doc! { "_id": id }).await?;

    tracing::info!("🗑️ Library {} deleted with {} book(s)", id, books.deleted_count);
    Ok(Json(ApiResponse::message("Library deleted")))
}
