pub mod auth;
pub mod conversations;
pub mod error;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod status;
pub mod users;
pub mod validate;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use tracing::error;

use murmur_db::Database;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::media::MAX_PHOTO_SIZE;

/// Run a store call off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> murmur_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })?
        .map_err(ApiError::from)
}

/// All API routes. Everything except login and liveness requires a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/session", post(auth::login))
        .route("/liveness", get(auth::liveness));

    let protected_routes = Router::new()
        .route("/user/me", get(users::get_me))
        .route("/user/me/username", put(users::set_username))
        .route("/user/me/photo", put(users::set_photo).layer(DefaultBodyLimit::max(MAX_PHOTO_SIZE)))
        .route("/user/all", get(users::list_users))
        .route("/user", get(users::search_users))
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route("/conversations/{id}", get(conversations::get_conversation))
        .route("/conversations/{id}/name", put(conversations::set_group_name))
        .route(
            "/conversations/{id}/photo",
            put(conversations::set_group_photo).layer(DefaultBodyLimit::max(MAX_PHOTO_SIZE)),
        )
        .route(
            "/conversations/{id}/members",
            get(conversations::list_members).post(conversations::add_members),
        )
        .route("/conversations/{id}/members/me", delete(conversations::leave_group))
        .route("/conversations/{id}/messages", post(messages::send_message))
        .route("/messages/{id}", delete(messages::delete_message))
        .route("/messages/{id}/forward", post(messages::forward_message))
        .route("/messages/{id}/reactions", post(reactions::add_reaction))
        .route("/messages/{id}/reactions/me", delete(reactions::remove_reaction))
        .route("/messages/{id}/status", put(status::update_status))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
