use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub photo_url: Option<String>,
}

/// Direct conversations never carry a name or photo; groups always have a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConversationKind {
    Direct,
    Group {
        name: String,
        photo: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: i64,
    #[serde(flatten)]
    pub kind: ConversationKind,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_direct(&self) -> bool {
        matches!(self.kind, ConversationKind::Direct)
    }

    pub fn group_name(&self) -> Option<&str> {
        match &self.kind {
            ConversationKind::Group { name, .. } => Some(name),
            ConversationKind::Direct => None,
        }
    }

    pub fn group_photo(&self) -> Option<&str> {
        match &self.kind {
            ConversationKind::Group { photo, .. } => photo.as_deref(),
            ConversationKind::Direct => None,
        }
    }
}

/// Message payload. A text message has content and no media, a photo message
/// has a media reference and no content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text {
        content: String,
    },
    Photo {
        #[serde(rename = "mediaUrl")]
        media_url: String,
    },
}

impl MessageContent {
    pub fn type_name(&self) -> &'static str {
        match self {
            MessageContent::Text { .. } => "text",
            MessageContent::Photo { .. } => "photo",
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text { content } => Some(content),
            MessageContent::Photo { .. } => None,
        }
    }

    pub fn media_url(&self) -> Option<&str> {
        match self {
            MessageContent::Photo { media_url } => Some(media_url),
            MessageContent::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    #[serde(flatten)]
    pub content: MessageContent,
    pub sent_at: DateTime<Utc>,
    pub conversation_id: i64,
    pub sender_id: String,
    pub reply_to: Option<i64>,
    pub forwarded_from: Option<i64>,
}

/// Input for message creation. The timestamp and id are always assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub sender_id: String,
    pub content: MessageContent,
    pub reply_to: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatus {
    pub user_id: String,
    pub message_id: i64,
    pub delivered: bool,
    pub seen: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: String,
    pub message_id: i64,
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionWithUser {
    pub user_id: String,
    pub username: String,
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageWithReactions {
    #[serde(flatten)]
    pub message: Message,
    pub reactions: Vec<ReactionWithUser>,
}

// -- Aggregate views --

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub last_message: Option<Message>,
    pub peer: Option<User>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub id: i64,
    #[serde(flatten)]
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender_username: String,
    pub delivered: Vec<String>,
    pub seen: Vec<String>,
    pub reply_preview: Option<ReplyPreview>,
    pub reactions: Vec<ReactionWithUser>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub member_count: usize,
    pub peer: Option<User>,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMembersOutcome {
    pub added: Vec<String>,
    pub already_present: Vec<String>,
}
