// src/errors.rs
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Why a submitted one-time password was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtpError {
    #[error("No OTP found for this identifier. Please request a new one")]
    NotFound,

    #[error("OTP has expired. Please request a new one")]
    Expired,

    #[error("Too many failed attempts. Please request a new OTP")]
    TooManyAttempts,

    #[error("Invalid OTP. {remaining} attempt(s) remaining")]
    InvalidCode { remaining: u32 },
}

impl OtpError {
    pub fn code(&self) -> &'static str {
        match self {
            OtpError::NotFound => "otp_not_found",
            OtpError::Expired => "otp_expired",
            OtpError::TooManyAttempts => "otp_too_many_attempts",
            OtpError::InvalidCode { .. } => "otp_invalid_code",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResetError {
    #[error("Invalid or expired reset token")]
    InvalidOrExpired,

    #[error("No account found for this reset token")]
    NotFound,
}

impl ResetError {
    pub fn code(&self) -> &'static str {
        match self {
            ResetError::InvalidOrExpired => "reset_invalid_or_expired",
            ResetError::NotFound => "reset_account_not_found",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[source] mongodb::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid ObjectId: {0}")]
    InvalidObjectId(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error(transparent)]
    Reset(#[from] ResetError),

    #[error("Email delivery failed: {0}")]
    EmailSend(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Redis error: {0}")]
    RedisError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::MongoDB(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            AppError::InvalidObjectId(_) => (StatusCode::BAD_REQUEST, "invalid_id"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::BAD_REQUEST, "conflict"),
            AppError::AuthError(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Otp(OtpError::TooManyAttempts) => {
                (StatusCode::TOO_MANY_REQUESTS, OtpError::TooManyAttempts.code())
            }
            AppError::Otp(e) => (StatusCode::BAD_REQUEST, e.code()),
            AppError::Reset(ResetError::NotFound) => {
                (StatusCode::NOT_FOUND, ResetError::NotFound.code())
            }
            AppError::Reset(e) => (StatusCode::BAD_REQUEST, e.code()),
            AppError::EmailSend(_) => (StatusCode::BAD_GATEWAY, "email_send_failed"),
            AppError::ExternalApi(_) => (StatusCode::BAD_GATEWAY, "external_api_error"),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            AppError::ConfigurationError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            AppError::RedisError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "cache_error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    /// Client-facing message. Server-side failures are reported generically.
    fn public_message(&self) -> String {
        match self {
            AppError::MongoDB(_) => "Database error".to_string(),
            AppError::Io(_) | AppError::Internal(_) | AppError::ConfigurationError(_) => {
                "Internal server error".to_string()
            }
            AppError::RedisError(_) => "Cache error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": self.public_message(),
            "code": code,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

// Server codes for a unique index violation.
fn is_duplicate_key(code: i32) -> bool {
    matches!(code, 11000 | 11001)
}

fn server_error_code(kind: &mongodb::error::ErrorKind) -> Option<i32> {
    use mongodb::error::{ErrorKind, WriteFailure};

    match kind {
        ErrorKind::Write(WriteFailure::WriteError(e)) => Some(e.code),
        ErrorKind::Command(e) => Some(e.code),
        _ => None,
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        if server_error_code(&err.kind).is_some_and(is_duplicate_key) {
            tracing::warn!("Unique index rejected a write: {}", err);
            return AppError::conflict("A record with these details already exists");
        }
        AppError::MongoDB(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ValidationError(format!("JSON parsing error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApi(format!("HTTP request failed: {}", err))
    }
}

impl From<mongodb::bson::oid::Error> for AppError {
    fn from(err: mongodb::bson::oid::Error) -> Self {
        AppError::InvalidObjectId(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::RedisError(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Password hashing failed: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Internal(format!("Token encoding failed: {}", err))
    }
}

// Helper conversion functions
impl AppError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::AuthError(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Parses a path or body id into an `ObjectId`.
pub fn parse_object_id(id: &str) -> Result<mongodb::bson::oid::ObjectId> {
    mongodb::bson::oid::ObjectId::parse_str(id)
        .map_err(|_| AppError::InvalidObjectId(id.to_string()))
}
