use axum::{extract::State, response::Json};
use validator::Validate;

use crate::dtos::auth_dtos::{EmailRequest, ResetPasswordRequest};
use crate::dtos::response::ApiResponse;
use crate::errors::Result;
use crate::middleware::extract::ApiJson;
use crate::state::AppState;

// 1. Forgot Password - same answer whether or not the account exists
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<EmailRequest>,
) -> Result<Json<ApiResponse<()>>> {
    req.validate()?;

    let message = state.resets.request(&req.email).await?;
    Ok(Json(ApiResponse::message(message)))
}

// 2. Reset Password - spends the emailed token
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>> {
    req.validate()?;

    state.resets.consume(req.token.trim(), &req.new_password).await?;
    Ok(Json(ApiResponse::message(
        "Password reset successful. You can now log in with your new password",
    )))
}
