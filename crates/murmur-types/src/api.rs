use serde::{Deserialize, Serialize};

use crate::models::{ConversationSummary, MessageContent};

// -- Session --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetUsernameRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search: String,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub is_direct: bool,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub group_photo: Option<String>,
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetGroupNameRequest {
    pub group_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMembersRequest {
    pub members: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MembersResponse {
    pub members: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(flatten)]
    pub content: MessageContent,
    #[serde(default)]
    pub reply_to: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForwardMessageRequest {
    pub conversation_id: i64,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactionRequest {
    pub emoji: String,
}

// -- Status --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub delivered: bool,
    #[serde(default)]
    pub seen: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
