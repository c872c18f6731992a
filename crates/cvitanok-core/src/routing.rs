use axum::Router;

use crate::controllers::{AppState, admin, api, auth, users, views};

// So applications can write `use cvitanok_core::routing::get;` etc.
pub use axum::routing::{MethodRouter, delete, get, patch, post, put};

/// All built-in routes.
///
/// The API router is nested under `api_v1_prefix`; its websocket echo is
/// also reachable at `/ws`.
pub fn build_routes(api_v1_prefix: &str) -> Router<AppState> {
    Router::new()
        .merge(views::routes())
        .nest(api_v1_prefix, api::routes())
        .route("/ws", get(api::ws_handler))
        .nest("/auth", auth::routes())
        .nest("/users", users::routes())
        .merge(admin::routes())
}
