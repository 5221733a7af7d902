use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use murmur_types::api::ReactionRequest;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Caller;
use crate::{blocking, validate};

pub async fn add_reaction(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(message_id): Path<i64>,
    Json(req): Json<ReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate::emoji(&req.emoji)?;

    let reaction = blocking(&state, move |db| {
        db.add_reaction(message_id, &caller.user_id, &req.emoji)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(reaction)))
}

/// DELETE /messages/{id}/reactions/me. Succeeds whether or not a reaction existed.
pub async fn remove_reaction(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(message_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |db| db.remove_reaction(message_id, &caller.user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
