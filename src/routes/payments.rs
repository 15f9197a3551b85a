use axum::{middleware, routing::get, Router};

use crate::handlers::payments::{
    create_payment, delete_payment, get_payment, list_payments, update_payment,
};
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(list_payments).post(create_payment))
        .route(
            "/:id",
            get(get_payment).put(update_payment).delete(delete_payment),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
