//! Row mapping between SQLite and the `murmur-types` models.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with microsecond
//! precision, so string comparison in SQL matches chronological order.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

use murmur_types::models::{
    Conversation, ConversationKind, Message, MessageContent, MessageStatus, Reaction,
    ReactionWithUser, User,
};

pub(crate) const USER_COLUMNS: &str = "uuid, username, photoUrl";

pub(crate) const CONVERSATION_COLUMNS: &str =
    "c.id, c.isDirect, c.groupName, c.groupPhoto, c.timestampCreated, c.timestampLastMessage";

pub(crate) const MESSAGE_COLUMNS: &str =
    "id, type, content, mediaUrl, timestamp, idConversation, uuidSender, idRepliesTo, idForwardedFrom";

/// Current time truncated to the stored precision, so values read back compare equal.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        photo_url: row.get(2)?,
    })
}

pub(crate) fn conversation_from_row(row: &Row) -> rusqlite::Result<Conversation> {
    let is_direct: bool = row.get(1)?;
    let kind = if is_direct {
        ConversationKind::Direct
    } else {
        ConversationKind::Group {
            name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            photo: row.get(3)?,
        }
    };

    Ok(Conversation {
        id: row.get(0)?,
        kind,
        created_at: ts_at(row, 4)?,
        last_message_at: ts_at(row, 5)?,
    })
}

pub(crate) fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    let kind: String = row.get(1)?;
    let content = match kind.as_str() {
        "photo" => MessageContent::Photo {
            media_url: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        },
        _ => MessageContent::Text {
            content: row.get(2)?,
        },
    };

    Ok(Message {
        id: row.get(0)?,
        content,
        sent_at: ts_at(row, 4)?,
        conversation_id: row.get(5)?,
        sender_id: row.get(6)?,
        reply_to: row.get(7)?,
        forwarded_from: row.get(8)?,
    })
}

/// Split message content into its (type, content, mediaUrl) columns.
pub(crate) fn content_columns(content: &MessageContent) -> (&'static str, &str, Option<&str>) {
    let kind = content.type_name();
    match content {
        MessageContent::Text { content } => (kind, content, None),
        MessageContent::Photo { media_url } => (kind, "", Some(media_url)),
    }
}

pub(crate) fn status_from_row(row: &Row) -> rusqlite::Result<MessageStatus> {
    Ok(MessageStatus {
        user_id: row.get(0)?,
        message_id: row.get(1)?,
        delivered: row.get(2)?,
        seen: row.get(3)?,
    })
}

pub(crate) fn reaction_from_row(row: &Row) -> rusqlite::Result<Reaction> {
    Ok(Reaction {
        user_id: row.get(0)?,
        message_id: row.get(1)?,
        emoji: row.get(2)?,
    })
}

pub(crate) fn reaction_with_user_from_row(row: &Row) -> rusqlite::Result<ReactionWithUser> {
    Ok(ReactionWithUser {
        user_id: row.get(0)?,
        username: row.get(1)?,
        emoji: row.get(2)?,
    })
}
