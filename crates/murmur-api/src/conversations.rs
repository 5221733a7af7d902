use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tracing::info;

use murmur_db::{Database, StoreError};
use murmur_types::api::{
    AddMembersRequest, ConversationsResponse, CreateConversationRequest, MembersResponse,
    SetGroupNameRequest,
};
use murmur_types::models::{AddMembersOutcome, Conversation, ConversationDetail};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Caller;
use crate::{blocking, validate};

/// The conversation, provided `user_id` is one of its members.
fn member_view(db: &Database, id: i64, user_id: &str) -> murmur_db::Result<Conversation> {
    let conversation = db.get_conversation(id)?;
    if !db.is_member(user_id, id)? {
        return Err(StoreError::Authorization(format!(
            "{} is not a member of conversation {}",
            user_id, id
        )));
    }
    Ok(conversation)
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let conversations =
        blocking(&state, move |db| db.list_conversation_summaries(&caller.user_id)).await?;
    Ok(Json(ConversationsResponse { conversations }))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let me = caller.user_id;

    let conversation = if req.is_direct {
        let [peer] = req.members.as_slice() else {
            return Err(ApiError::BadRequest(
                "a direct conversation takes exactly one other member".into(),
            ));
        };
        if req.group_name.is_some() || req.group_photo.is_some() {
            return Err(ApiError::BadRequest(
                "direct conversations have no name or photo".into(),
            ));
        }

        let peer = peer.clone();
        blocking(&state, move |db| {
            // Fast path for a readable error; the unique key still decides races.
            if db.find_direct_between(&me, &peer)?.is_some() {
                return Err(StoreError::Conflict(format!(
                    "direct conversation between {} and {} already exists",
                    me, peer
                )));
            }
            db.create_direct(&me, &peer)
        })
        .await?
    } else {
        let name = req
            .group_name
            .ok_or_else(|| ApiError::BadRequest("groups need a name".into()))?;
        validate::group_name(&name)?;
        if req.members.is_empty() {
            return Err(ApiError::BadRequest("groups need at least one member".into()));
        }

        let photo = req.group_photo;
        let members = req.members;
        let (conversation, outcome) = blocking(&state, move |db| {
            db.create_group_with_members(&me, &name, photo.as_deref(), &members)
        })
        .await?;
        if !outcome.already_present.is_empty() {
            info!(
                "Group {} created, skipped duplicate members {:?}",
                conversation.id, outcome.already_present
            );
        }
        conversation
    };

    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let detail = blocking(&state, move |db| db.conversation_detail(id, &caller.user_id)).await?;
    Ok(Json(detail))
}

pub async fn set_group_name(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Json(req): Json<SetGroupNameRequest>,
) -> Result<Json<Conversation>, ApiError> {
    validate::group_name(&req.group_name)?;

    let updated = blocking(&state, move |db| {
        member_view(db, id, &caller.user_id)?;
        db.set_group_name(id, &req.group_name)?;
        db.get_conversation(id)
    })
    .await?;
    Ok(Json(updated))
}

/// PUT /conversations/{id}/photo with the raw image as the body.
pub async fn set_group_photo(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Conversation>, ApiError> {
    // Check access before writing anything to disk.
    let user_id = caller.user_id.clone();
    let conversation = blocking(&state, move |db| member_view(db, id, &user_id)).await?;
    if conversation.is_direct() {
        return Err(ApiError::BadRequest(
            "direct conversations have no photo".into(),
        ));
    }

    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let reference = state.media.save(content_type, &body).await?;

    let stored = reference.clone();
    let result = blocking(&state, move |db| {
        db.set_group_photo(id, &stored)?;
        db.get_conversation(id)
    })
    .await;

    match result {
        Ok(updated) => {
            if let Some(old) = conversation.group_photo() {
                state.media.remove(old).await;
            }
            Ok(Json(updated))
        }
        Err(e) => {
            state.media.remove(&reference).await;
            Err(e)
        }
    }
}

pub async fn add_members(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Json(req): Json<AddMembersRequest>,
) -> Result<Json<AddMembersOutcome>, ApiError> {
    if req.members.is_empty() {
        return Err(ApiError::BadRequest("no members given".into()));
    }

    let outcome =
        blocking(&state, move |db| db.add_members(id, &caller.user_id, &req.members)).await?;
    Ok(Json(outcome))
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<Json<MembersResponse>, ApiError> {
    let members = blocking(&state, move |db| {
        member_view(db, id, &caller.user_id)?;
        db.list_members(id)
    })
    .await?;
    Ok(Json(MembersResponse { members }))
}

/// DELETE /conversations/{id}/members/me
pub async fn leave_group(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let deleted = blocking(&state, move |db| db.leave_group(&caller.user_id, id)).await?;
    if deleted {
        info!("Conversation {} removed after the last member left", id);
    }
    Ok(StatusCode::NO_CONTENT)
}
