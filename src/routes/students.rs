use axum::{middleware, routing::get, Router};

use crate::handlers::students::{
    create_student, delete_student, get_student, list_students, update_student,
};
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(list_students).post(create_student))
        .route(
            "/:id",
            get(get_student).put(update_student).delete(delete_student),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
