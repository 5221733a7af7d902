use axum::{
    Extension, Json,
    extract::{Path, State},
};

use murmur_types::api::UpdateStatusRequest;
use murmur_types::models::MessageStatus;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::middleware::Caller;

/// PUT /messages/{id}/status. Only recipients with a tracked status may update
/// it, and flags can only be raised.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(message_id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<MessageStatus>, ApiError> {
    if !req.delivered && !req.seen {
        return Err(ApiError::BadRequest(
            "delivered or seen must be true; flags cannot be cleared".into(),
        ));
    }

    let status = blocking(&state, move |db| {
        db.get_status(&caller.user_id, message_id)?;
        if req.seen {
            db.mark_seen(&caller.user_id, message_id)
        } else {
            db.mark_delivered(&caller.user_id, message_id)
        }
    })
    .await?;
    Ok(Json(status))
}
