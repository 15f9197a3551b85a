use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    options::ReturnDocument,
    Collection,
};
use validator::Validate;

use crate::dtos::response::{ApiResponse, Paginated, Pagination};
use crate::errors::{parse_object_id, AppError, Result};
use crate::handlers::access::{
    library_for_manager, managed_library_ids, scope_to_libraries, search_filter,
    student_for_manager,
};
use crate::handlers::auth::ensure_unique_contact;
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::{ApiJson, ApiQuery};
use crate::models::{
    notification::NOTIFICATIONS_COLLECTION,
    role::Role,
    student::{CreateStudent, StudentQuery, UpdateStudent},
    user::{normalize_email, User, UserResponse, USERS_COLLECTION},
};
use crate::state::AppState;

fn users(state: &AppState) -> Collection<User> {
    state.db.collection(USERS_COLLECTION)
}

pub async fn list_students(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<StudentQuery>,
) -> Result<Json<ApiResponse<Paginated<UserResponse>>>> {
    let mut filter = doc! { "role": Role::Student.as_str() };

    match query.library_id.as_deref() {
        Some(raw) => {
            let library_id = parse_object_id(raw)?;
            library_for_manager(&state, &auth, &library_id).await?;
            filter.insert("library_id", library_id);
        }
        None => scope_to_libraries(&mut filter, managed_library_ids(&state, &auth).await?),
    }
    if let Some(active) = query.active {
        filter.insert("active", active);
    }
    if let Some(search) = query
        .search
        .as_deref()
        .and_then(|s| search_filter(s, &["name", "email"]))
    {
        filter.extend(search);
    }

    let page = Pagination::new(query.page, query.limit);
    let total = users(&state).count_documents(filter.clone()).await?;
    let students: Vec<User> = users(&state)
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit)
        .await?
        .try_collect()
        .await?;

    Ok(Json(ApiResponse::ok(Paginated::new(
        students.into_iter().map(UserResponse::from).collect(),
        page,
        total,
    ))))
}

// Managers enroll students directly, so their email counts as verified.
pub async fn create_student(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<CreateStudent>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    auth.require_manager()?;
    payload.validate()?;

    let library_id = parse_object_id(&payload.library_id)?;
    library_for_manager(&state, &auth, &library_id).await?;

    let email = normalize_email(&payload.email);
    let phone = payload.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
    ensure_unique_contact(&state, &email, phone).await?;

    let password_hash = state.hasher.hash(&payload.password).await?;
    let mut student = User::new(payload.name.trim().to_string(), email, password_hash, Role::Student);
    student.phone = phone.map(str::to_string);
    student.library_id = Some(library_id);
    student.seat_number = payload.seat_number;
    student.email_verified = true;

    users(&state).insert_one(&student).await?;

    tracing::info!("🎓 Student {} enrolled in library {}", student.email, library_id);
    Ok(Json(
        ApiResponse::ok(UserResponse::from(student)).with_message("Student added"),
    ))
}

pub async fn get_student(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    let id = parse_object_id(&id)?;
    let student = student_for_manager(&state, &auth, &id).await?;
    Ok(Json(ApiResponse::ok(UserResponse::from(student))))
}

pub async fn update_student(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateStudent>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    payload.validate()?;
    let id = parse_object_id(&id)?;
    let current = student_for_manager(&state, &auth, &id).await?;

    let mut set = Document::new();
    if let Some(name) = payload.name {
        set.insert("name", name.trim());
    }
    if let Some(phone) = payload
        .phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
    {
        if current.phone.as_deref() != Some(phone.as_str()) {
            if users(&state).find_one(doc! { "phone": &phone }).await?.is_some() {
                return Err(AppError::conflict("Phone number is already registered"));
            }
            set.insert("phone", phone);
            set.insert("phone_verified", false);
        }
    }
    if let Some(seat_number) = payload.seat_number {
        set.insert("seat_number", seat_number);
    }
    if let Some(active) = payload.active {
        set.insert("active", active);
    }
    set.insert("updated_at", BsonDateTime::from_millis(Utc::now().timestamp_millis()));

    let student = users(&state)
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Student"))?;

    Ok(Json(
        ApiResponse::ok(UserResponse::from(student)).with_message("Student updated"),
    ))
}

// Payment history is kept; direct notifications are removed with the account.
pub async fn delete_student(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let id = parse_object_id(&id)?;
    let student = student_for_manager(&state, &auth, &id).await?;

    users(&state).delete_one(doc! { "_id": id }).await?;
    state
        .db
        .collection::<Document>(NOTIFICATIONS_COLLECTION)
        .delete_many(doc! { "recipient_id": id })
        .await?;

    tracing::info!("🗑️ Student {} removed", student.email);
    Ok(Json(ApiResponse::message("Student removed")))
}
