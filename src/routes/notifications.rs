use axum::{
    middleware,
    routing::{delete, get, put},
    Router,
};

use crate::handlers::notifications::{
    delete_notification, list_notifications, mark_all_read, mark_read, send_notification,
};
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications).post(send_notification))
        .route("/read-all", put(mark_all_read))
        .route("/:id/read", put(mark_read))
        .route("/:id", delete(delete_notification))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
