use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::auth::{
    login, me, resend_otp, send_phone_otp, signup, verify_otp, verify_phone,
};
use crate::handlers::password_reset::{forgot_password, reset_password};
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(me))
        .route("/phone/send-otp", post(send_phone_otp))
        .route("/phone/verify", post(verify_phone))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/verify-otp", post(verify_otp))
        .route("/resend-otp", post(resend_otp))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .merge(protected)
}
