use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, header},
};

use murmur_types::api::{SearchQuery, SetUsernameRequest};
use murmur_types::models::User;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Caller;
use crate::{blocking, validate};

pub async fn get_me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<User>, ApiError> {
    let user = blocking(&state, move |db| db.get_user(&caller.user_id)).await?;
    Ok(Json(user))
}

pub async fn set_username(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<SetUsernameRequest>,
) -> Result<Json<User>, ApiError> {
    validate::username(&req.username)?;

    let user = blocking(&state, move |db| {
        db.set_username(&caller.user_id, &req.username)?;
        db.get_user(&caller.user_id)
    })
    .await?;
    Ok(Json(user))
}

/// PUT /user/me/photo with the raw image as the body.
pub async fn set_photo(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<User>, ApiError> {
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let reference = state.media.save(content_type, &body).await?;

    let stored = reference.clone();
    let result = blocking(&state, move |db| {
        db.set_user_photo(&caller.user_id, &stored)?;
        db.get_user(&caller.user_id)
    })
    .await;

    match result {
        Ok(user) => Ok(Json(user)),
        Err(e) => {
            state.media.remove(&reference).await;
            Err(e)
        }
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = blocking(&state, |db| db.list_users()).await?;
    Ok(Json(users))
}

/// GET /user?search=prefix
pub async fn search_users(
    State(state): State<AppState>,
    Extension(_caller): Extension<Caller>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    validate::search_prefix(&query.search)?;
    let users = blocking(&state, move |db| db.search_users(&query.search)).await?;
    Ok(Json(users))
}
