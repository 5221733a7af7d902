use rusqlite::{Connection, params};
use tracing::{debug, info};

use murmur_types::models::{Message, MessageContent, MessageWithReactions, NewMessage};

use crate::conversations::touch_last_activity;
use crate::error::OptionalExt;
use crate::members::require_member;
use crate::models::{MESSAGE_COLUMNS, content_columns, format_ts, message_from_row, now};
use crate::reactions::reactions_in_conversation;
use crate::{Database, Result, StoreError};

impl Database {
    /// Persist a message, bump the conversation's last activity and fan out a
    /// `{delivered, !seen}` status row to every other member, all in one
    /// transaction. The send time is assigned here; nothing is kept on failure.
    pub fn create_message(&self, new: &NewMessage) -> Result<Message> {
        validate_content(&new.content)?;
        self.transaction(|tx| insert_message(tx, new, None))
    }

    pub fn get_message(&self, id: i64) -> Result<Message> {
        self.with_conn(|conn| require_message(conn, id))
    }

    /// Messages of a conversation in send order, each with its reactions.
    pub fn list_messages(&self, conversation_id: i64) -> Result<Vec<MessageWithReactions>> {
        self.with_conn(|conn| {
            let messages = query_messages(conn, conversation_id)?;
            let mut reactions = reactions_in_conversation(conn, conversation_id)?;
            Ok(messages
                .into_iter()
                .map(|message| MessageWithReactions {
                    reactions: reactions.remove(&message.id).unwrap_or_default(),
                    message,
                })
                .collect())
        })
    }

    /// Delete a message on behalf of its sender. Statuses and reactions go with
    /// it; replies and forwards keep their now dangling reference.
    pub fn delete_message(&self, id: i64, requester: &str) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM message WHERE id = ?1 AND uuidSender = ?2",
                params![id, requester],
            )?;
            if deleted > 0 {
                info!("Message {} deleted by {}", id, requester);
                return Ok(());
            }

            // Nothing deleted: tell "someone else's message" from "no such message".
            if message_exists(conn, id)? {
                Err(StoreError::Authorization(format!(
                    "message {} was not sent by {}",
                    id, requester
                )))
            } else {
                Err(StoreError::NotFound(format!("message {}", id)))
            }
        })
    }

    /// Copy a message into `destination` as a new message from `requester`,
    /// going through the same creation path as [`Database::create_message`].
    /// The requester must belong to both the source and destination conversations.
    pub fn forward_message(&self, original_id: i64, destination: i64, requester: &str) -> Result<Message> {
        self.transaction(|tx| {
            let original = require_message(tx, original_id)?;
            require_member(tx, requester, original.conversation_id)?;
            require_member(tx, requester, destination)?;

            let new = NewMessage {
                conversation_id: destination,
                sender_id: requester.to_string(),
                content: original.content,
                reply_to: None,
            };
            insert_message(tx, &new, Some(original_id))
        })
    }

    pub fn last_message(&self, conversation_id: i64) -> Result<Option<Message>> {
        self.with_conn(|conn| query_last_message(conn, conversation_id))
    }
}

fn validate_content(content: &MessageContent) -> Result<()> {
    match content {
        MessageContent::Text { content } if content.trim().is_empty() => Err(
            StoreError::Validation("text messages need non-empty content".into()),
        ),
        MessageContent::Photo { media_url } if media_url.trim().is_empty() => Err(
            StoreError::Validation("photo messages need a media reference".into()),
        ),
        _ => Ok(()),
    }
}

fn insert_message(conn: &Connection, new: &NewMessage, forwarded_from: Option<i64>) -> Result<Message> {
    let last_activity: String = conn
        .query_row(
            "SELECT timestampLastMessage FROM conversation WHERE id = ?1",
            [new.conversation_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("conversation {}", new.conversation_id)))?;

    require_member(conn, &new.sender_id, new.conversation_id)?;

    if let Some(reply_to) = new.reply_to {
        let target_conversation: Option<i64> = conn
            .query_row(
                "SELECT idConversation FROM message WHERE id = ?1",
                [reply_to],
                |row| row.get(0),
            )
            .optional()?;
        if target_conversation != Some(new.conversation_id) {
            return Err(StoreError::NotFound(format!(
                "message {} in conversation {}",
                reply_to, new.conversation_id
            )));
        }
    }

    // Never stamp a message earlier than the conversation's latest activity,
    // so send order within a conversation is total even if the clock steps back.
    let mut sent_at = now();
    let mut ts = format_ts(sent_at);
    if ts < last_activity {
        sent_at = chrono::DateTime::parse_from_rfc3339(&last_activity)
            .map(|t| t.with_timezone(&chrono::Utc))
            .map_err(|e| StoreError::Storage(format!("corrupt timestampLastMessage: {}", e)))?;
        ts = last_activity;
    }

    let (kind, content, media_url) = content_columns(&new.content);
    conn.execute(
        "INSERT INTO message (type, content, mediaUrl, timestamp, idConversation, uuidSender, idRepliesTo, idForwardedFrom)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            kind,
            content,
            media_url,
            ts,
            new.conversation_id,
            new.sender_id,
            new.reply_to,
            forwarded_from
        ],
    )?;
    let id = conn.last_insert_rowid();

    touch_last_activity(conn, new.conversation_id, &ts)?;

    let recipients = conn.execute(
        "INSERT INTO messageStatus (uuidUser, idMessage, delivered, seen)
         SELECT uuidUser, ?1, 1, 0 FROM member
         WHERE idConversation = ?2 AND uuidUser <> ?3",
        params![id, new.conversation_id, new.sender_id],
    )?;

    debug!(
        "Message {} stored in conversation {} ({} recipients)",
        id, new.conversation_id, recipients
    );

    Ok(Message {
        id,
        content: new.content.clone(),
        sent_at,
        conversation_id: new.conversation_id,
        sender_id: new.sender_id.clone(),
        reply_to: new.reply_to,
        forwarded_from,
    })
}

pub(crate) fn query_message(conn: &Connection, id: i64) -> Result<Option<Message>> {
    let sql = format!("SELECT {} FROM message WHERE id = ?1", MESSAGE_COLUMNS);
    conn.query_row(&sql, [id], message_from_row).optional()
}

pub(crate) fn require_message(conn: &Connection, id: i64) -> Result<Message> {
    query_message(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("message {}", id)))
}

fn message_exists(conn: &Connection, id: i64) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM message WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub(crate) fn query_messages(conn: &Connection, conversation_id: i64) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {} FROM message WHERE idConversation = ?1 ORDER BY timestamp ASC, id ASC",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let messages = stmt
        .query_map([conversation_id], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(messages)
}

pub(crate) fn query_last_message(conn: &Connection, conversation_id: i64) -> Result<Option<Message>> {
    let sql = format!(
        "SELECT {} FROM message WHERE idConversation = ?1 ORDER BY timestamp DESC, id DESC LIMIT 1",
        MESSAGE_COLUMNS
    );
    conn.query_row(&sql, [conversation_id], message_from_row).optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::testutil::seeded;

    fn text(conversation_id: i64, sender: &str, body: &str) -> NewMessage {
        NewMessage {
            conversation_id,
            sender_id: sender.to_string(),
            content: MessageContent::Text {
                content: body.to_string(),
            },
            reply_to: None,
        }
    }

    #[test]
    fn create_fans_out_to_everyone_but_sender() {
        let db = seeded();
        let (group, _) = db
            .create_group_with_members("1", "crew", None, &["2".to_string(), "3".to_string()])
            .unwrap();

        let msg = db.create_message(&text(group.id, "1", "hi all")).unwrap();

        let mut statuses = db.list_statuses(msg.id).unwrap();
        statuses.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let users: Vec<&str> = statuses.iter().map(|s| s.user_id.as_str()).collect();
        assert_eq!(users, vec!["2", "3"]);
        assert!(statuses.iter().all(|s| s.delivered && !s.seen));
        assert_eq!(db.get_status("1", msg.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn create_bumps_last_activity_to_send_time() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();
        let msg = db.create_message(&text(conv.id, "1", "hi")).unwrap();

        let stored = db.get_message(msg.id).unwrap();
        assert_eq!(stored, msg);
        assert_eq!(db.get_conversation(conv.id).unwrap().last_message_at, msg.sent_at);
    }

    #[test]
    fn send_time_never_precedes_last_activity() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();
        let future = "2999-01-01T00:00:00.000000Z";
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE conversation SET timestampLastMessage = ?1 WHERE id = ?2",
                params![future, conv.id],
            )?;
            Ok(())
        })
        .unwrap();

        let first = db.create_message(&text(conv.id, "1", "one")).unwrap();
        let second = db.create_message(&text(conv.id, "2", "two")).unwrap();
        assert_eq!(format_ts(first.sent_at), future);

        let listed: Vec<i64> = db
            .list_messages(conv.id)
            .unwrap()
            .iter()
            .map(|m| m.message.id)
            .collect();
        assert_eq!(listed, vec![first.id, second.id]);
    }

    #[test]
    fn non_member_cannot_send() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();
        let err = db.create_message(&text(conv.id, "3", "let me in")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let err = db.create_message(&text(4242, "1", "anyone?")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn empty_content_is_rejected() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();
        let err = db.create_message(&text(conv.id, "1", "   ")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let photo = NewMessage {
            content: MessageContent::Photo {
                media_url: String::new(),
            },
            ..text(conv.id, "1", "")
        };
        assert_eq!(db.create_message(&photo).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn reply_target_must_exist_in_conversation() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();
        let other = db.create_direct("1", "3").unwrap();
        let elsewhere = db.create_message(&text(other.id, "1", "elsewhere")).unwrap();
        let original = db.create_message(&text(conv.id, "1", "question?")).unwrap();

        let reply = NewMessage {
            reply_to: Some(original.id),
            ..text(conv.id, "2", "answer")
        };
        assert_eq!(db.create_message(&reply).unwrap().reply_to, Some(original.id));

        for target in [999, elsewhere.id] {
            let bad = NewMessage {
                reply_to: Some(target),
                ..text(conv.id, "2", "answer")
            };
            assert_eq!(db.create_message(&bad).unwrap_err().kind(), ErrorKind::NotFound);
        }
    }

    #[test]
    fn photo_messages_roundtrip_media() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();
        let photo = NewMessage {
            content: MessageContent::Photo {
                media_url: "/media/cat.png".into(),
            },
            ..text(conv.id, "1", "")
        };
        let msg = db.create_message(&photo).unwrap();
        let stored = db.get_message(msg.id).unwrap();
        assert_eq!(stored.content.media_url(), Some("/media/cat.png"));
        assert_eq!(stored.content.text(), None);
    }

    #[test]
    fn only_sender_may_delete() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();
        let msg = db.create_message(&text(conv.id, "1", "oops")).unwrap();

        let err = db.delete_message(msg.id, "2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        db.delete_message(msg.id, "1").unwrap();
        assert_eq!(db.get_message(msg.id).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(db.delete_message(msg.id, "1").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn deleting_a_replied_message_leaves_reply_dangling() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();
        let original = db.create_message(&text(conv.id, "1", "question?")).unwrap();
        db.add_reaction(original.id, "2", "👍").unwrap();
        let reply = db
            .create_message(&NewMessage {
                reply_to: Some(original.id),
                ..text(conv.id, "2", "answer")
            })
            .unwrap();

        db.delete_message(original.id, "1").unwrap();

        let listed = db.list_messages(conv.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message.reply_to, Some(original.id));
        assert!(db.list_statuses(original.id).unwrap().is_empty());
        assert!(db.list_reactions(original.id).unwrap().is_empty());
        assert_eq!(db.get_message(reply.id).unwrap().id, reply.id);
    }

    #[test]
    fn forward_copies_content_into_destination() {
        let db = seeded();
        let source = db.create_direct("1", "2").unwrap();
        let (dest, _) = db
            .create_group_with_members("2", "crew", None, &["3".to_string(), "4".to_string()])
            .unwrap();
        let original = db.create_message(&text(source.id, "1", "pass it on")).unwrap();

        let forwarded = db.forward_message(original.id, dest.id, "2").unwrap();
        assert_eq!(forwarded.conversation_id, dest.id);
        assert_eq!(forwarded.sender_id, "2");
        assert_eq!(forwarded.forwarded_from, Some(original.id));
        assert_eq!(forwarded.reply_to, None);
        assert_eq!(forwarded.content, original.content);
        assert_eq!(db.list_statuses(forwarded.id).unwrap().len(), 2);
    }

    #[test]
    fn forward_requires_destination_membership() {
        let db = seeded();
        let source = db.create_direct("1", "2").unwrap();
        let dest = db.create_group("3", "other", None).unwrap();
        let original = db.create_message(&text(source.id, "1", "secret")).unwrap();

        let err = db.forward_message(original.id, dest.id, "1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        let err = db.forward_message(999, dest.id, "3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(db.last_message(dest.id).unwrap().is_none());
    }

    #[test]
    fn forward_requires_access_to_source() {
        let db = seeded();
        let source = db.create_direct("1", "2").unwrap();
        let dest = db.create_group("3", "other", None).unwrap();
        let original = db.create_message(&text(source.id, "1", "between us")).unwrap();

        let err = db.forward_message(original.id, dest.id, "3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(db.last_message(dest.id).unwrap().is_none());
    }
}
