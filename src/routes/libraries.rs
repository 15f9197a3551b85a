use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::books::{
    create_book, delete_book, get_book, list_books, read_book, update_book,
};
use crate::handlers::libraries::{
    create_library, delete_library, get_library, list_libraries, update_library,
};
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(list_libraries).post(create_library))
        .route(
            "/:id",
            get(get_library).put(update_library).delete(delete_library),
        )
        // Books live under their library
        .route("/:id/books", get(list_books).post(create_book))
        .route(
            "/:id/books/:book_id",
            get(get_book).put(update_book).delete(delete_book),
        )
        .route("/:id/books/:book_id/read", post(read_book))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
