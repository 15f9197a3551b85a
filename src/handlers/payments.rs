use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document},
    options::ReturnDocument,
    Collection,
};
use validator::Validate;

use crate::dtos::response::{ApiResponse, Paginated, Pagination};
use crate::errors::{parse_object_id, AppError, Result};
use crate::handlers::access::{
    active_student, library_for_manager, managed_library_ids, scope_to_libraries,
    student_for_manager,
};
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::{ApiJson, ApiQuery};
use crate::models::payment::{
    CreatePayment, Payment, PaymentQuery, PaymentResponse, PaymentStatus, UpdatePayment,
    PAYMENTS_COLLECTION,
};
use crate::models::role::Role;
use crate::state::AppState;

fn payments(state: &AppState) -> Collection<Payment> {
    state.db.collection(PAYMENTS_COLLECTION)
}

fn now_bson() -> BsonDateTime {
    BsonDateTime::from_millis(Utc::now().timestamp_millis())
}

/// `paid_at` follows the status: stamped on completion, cleared otherwise.
fn paid_at_for(status: PaymentStatus) -> Option<BsonDateTime> {
    (status == PaymentStatus::Completed).then(now_bson)
}

/// Payment the caller may see: the paying student, or a manager of its library.
async fn visible_payment(state: &AppState, auth: &AuthUser, id: &ObjectId) -> Result<Payment> {
    let payment = payments(state)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Payment"))?;

    if auth.role == Role::Student {
        active_student(state, auth).await?;
        if payment.student_id != auth.id {
            return Err(AppError::not_found("Payment"));
        }
    } else {
        library_for_manager(state, auth, &payment.library_id).await?;
    }
    Ok(payment)
}

pub async fn list_payments(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<PaymentQuery>,
) -> Result<Json<ApiResponse<Paginated<PaymentResponse>>>> {
    let mut filter = Document::new();

    if auth.role == Role::Student {
        active_student(&state, &auth).await?;
        filter.insert("student_id", auth.id);
    } else {
        match query.library_id.as_deref() {
            Some(raw) => {
                let library_id = parse_object_id(raw)?;
                library_for_manager(&state, &auth, &library_id).await?;
                filter.insert("library_id", library_id);
            }
            None => scope_to_libraries(&mut filter, managed_library_ids(&state, &auth).await?),
        }
        if let Some(raw) = query.student_id.as_deref() {
            filter.insert("student_id", parse_object_id(raw)?);
        }
    }
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }

    let page = Pagination::new(query.page, query.limit);
    let total = payments(&state).count_documents(filter.clone()).await?;
    let items: Vec<Payment> = payments(&state)
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit)
        .await?
        .try_collect()
        .await?;

    Ok(Json(ApiResponse::ok(Paginated::new(
        items.into_iter().map(PaymentResponse::from).collect(),
        page,
        total,
    ))))
}

pub async fn create_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<CreatePayment>,
) -> Result<Json<ApiResponse<PaymentResponse>>> {
    auth.require_manager()?;
    payload.validate()?;

    let student_id = parse_object_id(&payload.student_id)?;
    let student = student_for_manager(&state, &auth, &student_id).await?;
    let library_id = student
        .library_id
        .ok_or_else(|| AppError::not_found("Student"))?;

    let status = payload.status.unwrap_or(PaymentStatus::Pending);
    let now = Utc::now();
    let payment = Payment {
        id: Some(ObjectId::new()),
        library_id,
        student_id,
        amount: payload.amount,
        method: payload.method,
        status,
        description: payload.description.trim().to_string(),
        paid_at: paid_at_for(status),
        created_at: now,
        updated_at: now,
    };
    payments(&state).insert_one(&payment).await?;

    tracing::info!(
        "💰 Recorded {} payment of {:.2} for {}",
        status.as_str(),
        payment.amount,
        student.email
    );
    Ok(Json(
        ApiResponse::ok(PaymentResponse::from(payment)).with_message("Payment recorded"),
    ))
}

pub async fn get_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PaymentResponse>>> {
    let id = parse_object_id(&id)?;
    let payment = visible_payment(&state, &auth, &id).await?;
    Ok(Json(ApiResponse::ok(PaymentResponse::from(payment))))
}

pub async fn update_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdatePayment>,
) -> Result<Json<ApiResponse<PaymentResponse>>> {
    auth.require_manager()?;
    payload.validate()?;
    let id = parse_object_id(&id)?;
    let current = visible_payment(&state, &auth, &id).await?;

    let mut set = Document::new();
    if let Some(amount) = payload.amount {
        set.insert("amount", amount);
    }
    if let Some(method) = payload.method {
        set.insert("method", method.as_str());
    }
    if let Some(description) = payload.description {
        set.insert("description", description.trim());
    }
    if let Some(status) = payload.status {
        if status != current.status {
            set.insert("status", status.as_str());
            set.insert(
                "paid_at",
                paid_at_for(status).map(Bson::DateTime).unwrap_or(Bson::Null),
            );
        }
    }
    set.insert("updated_at", now_bson());

    let payment = payments(&state)
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Payment"))?;

    Ok(Json(
        ApiResponse::ok(PaymentResponse::from(payment)).with_message("Payment updated"),
    ))
}

pub async fn delete_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    auth.require_manager()?;
    let id = parse_object_id(&id)?;
    visible_payment(&state, &auth, &id).await?;

    payments(&state).delete_one(doc! { "_id": id }).await?;
    Ok(Json(ApiResponse::message("Payment deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paid_at_tracks_completion() {
        assert!(paid_at_for(PaymentStatus::Completed).is_some());
        assert!(paid_at_for(PaymentStatus::Pending).is_none());
        assert!(paid_at_for(PaymentStatus::Failed).is_none());
    }
}
