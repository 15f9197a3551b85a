use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, Document},
    Collection,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::dtos::response::{ApiResponse, Paginated, Pagination};
use crate::errors::{parse_object_id, AppError, Result};
use crate::handlers::access::{
    check_recipient, find_user, library_for_manager, managed_library_ids, scope_to_libraries,
    student_library_id,
};
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::{ApiJson, ApiQuery};
use crate::models::notification::{
    Notification, NotificationQuery, NotificationResponse, SendNotificationRequest,
    NOTIFICATIONS_COLLECTION,
};
use crate::models::role::Role;
use crate::state::AppState;

fn notifications(state: &AppState) -> Collection<Notification> {
    state.db.collection(NOTIFICATIONS_COLLECTION)
}

/// Broadcasts for the student's library plus anything addressed to them.
fn student_inbox(library_id: ObjectId, student_id: ObjectId) -> Document {
    doc! {
        "library_id": library_id,
        "$or": [
            { "recipient_id": Bson::Null },
            { "recipient_id": student_id },
        ],
    }
}

/// Notifications the caller may see.
async fn visible_filter(state: &AppState, auth: &AuthUser) -> Result<Document> {
    if auth.role == Role::Student {
        let library_id = student_library_id(state, auth).await?;
        Ok(student_inbox(library_id, auth.id))
    } else {
        let mut filter = Document::new();
        scope_to_libraries(&mut filter, managed_library_ids(state, auth).await?);
        Ok(filter)
    }
}

pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<Json<ApiResponse<Paginated<NotificationResponse>>>> {
    let mut filter = visible_filter(&state, &auth).await?;
    if query.unread_only {
        filter.insert("read_by", doc! { "$ne": auth.id });
    }

    let page = Pagination::new(query.page, query.limit);
    let total = notifications(&state).count_documents(filter.clone()).await?;
    let items: Vec<Notification> = notifications(&state)
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit)
        .await?
        .try_collect()
        .await?;

    Ok(Json(ApiResponse::ok(Paginated::new(
        items
            .into_iter()
            .map(|n| NotificationResponse::for_viewer(n, &auth.id))
            .collect(),
        page,
        total,
    ))))
}

pub async fn send_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<SendNotificationRequest>,
) -> Result<Json<ApiResponse<NotificationResponse>>> {
    auth.require_manager()?;
    payload.validate()?;

    let library_id = parse_object_id(&payload.library_id)?;
    library_for_manager(&state, &auth, &library_id).await?;

    let recipient_id = match payload.recipient_id.as_deref().filter(|r| !r.is_empty()) {
        Some(raw) => {
            let recipient_id = parse_object_id(raw)?;
            let recipient = find_user(&state, &recipient_id).await?;
            check_recipient(&recipient, &library_id)?;
            Some(recipient_id)
        }
        None => None,
    };

    let notification = Notification {
        id: Some(ObjectId::new()),
        library_id,
        recipient_id,
        title: payload.title.trim().to_string(),
        message: payload.message.trim().to_string(),
        created_by: auth.id,
        read_by: Vec::new(),
        created_at: Utc::now(),
    };
    notifications(&state).insert_one(&notification).await?;

    match recipient_id {
        Some(id) => tracing::info!("🔔 Notification sent to student {}", id),
        None => tracing::info!("📢 Notification broadcast to library {}", library_id),
    }
    Ok(Json(
        ApiResponse::ok(NotificationResponse::for_viewer(notification, &auth.id))
            .with_message("Notification sent"),
    ))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let id = parse_object_id(&id)?;
    let mut filter = visible_filter(&state, &auth).await?;
    filter.insert("_id", id);

    let result = notifications(&state)
        .update_one(filter, doc! { "$addToSet": { "read_by": auth.id } })
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::not_found("Notification"));
    }
    Ok(Json(ApiResponse::message("Notification marked as read")))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Value>>> {
    let mut filter = visible_filter(&state, &auth).await?;
    filter.insert("read_by", doc! { "$ne": auth.id });

    let result = notifications(&state)
        .update_many(filter, doc! { "$addToSet": { "read_by": auth.id } })
        .await?;

    Ok(Json(
        ApiResponse::ok(json!({ "updated": result.modified_count }))
            .with_message("All notifications marked as read"),
    ))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    auth.require_manager()?;
    let id = parse_object_id(&id)?;

    let notification = notifications(&state)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Notification"))?;
    library_for_manager(&state, &auth, &notification.library_id).await?;

    notifications(&state).delete_one(doc! { "_id": id }).await?;
    Ok(Json(ApiResponse::message("Notification deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_student_inbox_includes_broadcasts_and_direct_messages() {
        let library = ObjectId::new();
        let student = ObjectId::new();
        let filter = student_inbox(library, student);

        assert_eq!(filter.get_object_id("library_id").unwrap(), library);
        let branches = filter.get_array("$or").unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(
            branches[1].as_document().unwrap().get_object_id("recipient_id").unwrap(),
            student
        );
    }
}
