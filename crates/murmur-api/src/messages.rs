use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use murmur_types::api::{ForwardMessageRequest, SendMessageRequest};
use murmur_types::models::{MessageContent, NewMessage};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Caller;
use crate::{blocking, validate};

pub async fn send_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(conversation_id): Path<i64>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match &req.content {
        MessageContent::Text { content } => validate::text(content)?,
        MessageContent::Photo { media_url } if media_url.trim().is_empty() => {
            return Err(ApiError::BadRequest("photo messages need a mediaUrl".into()));
        }
        MessageContent::Photo { .. } => {}
    }

    let new = NewMessage {
        conversation_id,
        sender_id: caller.user_id,
        content: req.content,
        reply_to: req.reply_to,
    };
    let message = blocking(&state, move |db| db.create_message(&new)).await?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(message_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |db| db.delete_message(message_id, &caller.user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn forward_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(message_id): Path<i64>,
    Json(req): Json<ForwardMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(&state, move |db| {
        db.forward_message(message_id, req.conversation_id, &caller.user_id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}
