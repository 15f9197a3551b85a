use axum::{extract::State, response::Json};
use chrono::Utc;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    options::ReturnDocument,
    Collection,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::dtos::auth_dtos::{
    AuthResponse, EmailRequest, LoginRequest, PhoneVerifyRequest, SignupRequest, VerifyOtpRequest,
};
use crate::dtos::response::ApiResponse;
use crate::errors::{AppError, Result};
use crate::handlers::access::find_user;
use crate::middleware::auth::{create_token, AuthUser};
use crate::middleware::extract::ApiJson;
use crate::models::role::Role;
use crate::models::user::{normalize_email, User, UserResponse, USERS_COLLECTION};
use crate::state::AppState;

const OTP_SENT_MESSAGE: &str = "An OTP has been sent to your email";

fn users(state: &AppState) -> Collection<User> {
    state.db.collection(USERS_COLLECTION)
}

fn now_bson() -> BsonDateTime {
    BsonDateTime::from_millis(Utc::now().timestamp_millis())
}

/// Rejects an email or phone that already belongs to an account.
pub async fn ensure_unique_contact(
    state: &AppState,
    email: &str,
    phone: Option<&str>,
) -> Result<()> {
    if users(state).find_one(doc! { "email": email }).await?.is_some() {
        return Err(AppError::conflict("Email is already registered"));
    }
    if let Some(phone) = phone {
        if users(state).find_one(doc! { "phone": phone }).await?.is_some() {
            return Err(AppError::conflict("Phone number is already registered"));
        }
    }
    Ok(())
}

// Owner signup: create an unverified account, then email an OTP.
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SignupRequest>,
) -> Result<Json<ApiResponse<Value>>> {
    payload.validate()?;

    let email = normalize_email(&payload.email);
    let phone = payload.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
    ensure_unique_contact(&state, &email, phone).await?;

    let password_hash = state.hasher.hash(&payload.password).await?;
    let mut user = User::new(payload.name.trim().to_string(), email, password_hash, Role::Owner);
    user.phone = phone.map(str::to_string);

    users(&state).insert_one(&user).await?;
    tracing::info!("👤 Owner account created for {}", user.email);

    state.otp.issue_new(&user.email).await?;

    Ok(Json(
        ApiResponse::ok(json!({ "email": user.email, "otp_required": true }))
            .with_message("Account created. Enter the OTP sent to your email to continue"),
    ))
}

// Password check, then a second factor by email OTP.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<ApiResponse<Value>>> {
    payload.validate()?;

    let email = normalize_email(&payload.email);
    let invalid = || AppError::unauthorized("Invalid email or password");

    let user = users(&state)
        .find_one(doc! { "email": &email })
        .await?
        .ok_or_else(invalid)?;

    if !state.hasher.verify(&payload.password, &user.password_hash).await? {
        tracing::warn!("Failed login for {}", email);
        return Err(invalid());
    }
    if !user.active {
        return Err(AppError::forbidden("This account has been deactivated"));
    }

    state.otp.issue_new(&user.email).await?;

    Ok(Json(
        ApiResponse::ok(json!({ "email": user.email, "otp_required": true }))
            .with_message(OTP_SENT_MESSAGE),
    ))
}

// Completes signup or login: checks the OTP and returns a session token.
pub async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<VerifyOtpRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>> {
    payload.validate()?;

    let email = normalize_email(&payload.email);
    state.otp.verify(&email, &payload.otp).await?;

    let user = users(&state)
        .find_one_and_update(
            doc! { "email": &email },
            doc! { "$set": { "email_verified": true, "updated_at": now_bson() } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Account"))?;

    if !user.active {
        return Err(AppError::forbidden("This account has been deactivated"));
    }

    let id = user.id.ok_or_else(|| AppError::internal("stored user has no id"))?;
    let token = create_token(&id, user.role, &state.config.jwt_secret, state.config.jwt_ttl_days)?;

    tracing::info!("🔓 {} signed in as {}", user.email, user.role);
    Ok(Json(
        ApiResponse::ok(AuthResponse {
            user: UserResponse::from(user),
            token,
        })
        .with_message("Verification successful"),
    ))
}

pub async fn resend_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> Result<Json<ApiResponse<()>>> {
    payload.validate()?;

    let email = normalize_email(&payload.email);
    if users(&state).find_one(doc! { "email": &email }).await?.is_some() {
        state.otp.issue_new(&email).await?;
    } else {
        tracing::warn!("OTP resend requested for unknown email");
    }

    Ok(Json(ApiResponse::message(
        "If an account exists for that email, a new OTP has been sent",
    )))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<UserResponse>>> {
    let user = find_user(&state, &auth.id).await?;
    Ok(Json(ApiResponse::ok(UserResponse::from(user))))
}

pub async fn send_phone_otp(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<()>>> {
    let user = find_user(&state, &auth.id).await?;
    let phone = user
        .phone
        .ok_or_else(|| AppError::invalid_data("No phone number on this account"))?;

    state.otp.issue_new(&phone).await?;
    Ok(Json(ApiResponse::message("An OTP has been sent to your phone")))
}

pub async fn verify_phone(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<PhoneVerifyRequest>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    payload.validate()?;

    let user = find_user(&state, &auth.id).await?;
    let phone = user
        .phone
        .ok_or_else(|| AppError::invalid_data("No phone number on this account"))?;
    state.otp.verify(&phone, &payload.otp).await?;

    let user = users(&state)
        .find_one_and_update(
            doc! { "_id": auth.id },
            doc! { "$set": { "phone_verified": true, "updated_at": now_bson() } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    Ok(Json(
        ApiResponse::ok(UserResponse::from(user)).with_message("Phone number verified"),
    ))
}
