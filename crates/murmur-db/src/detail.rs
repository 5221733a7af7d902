//! The aggregate conversation read: metadata, ordered messages and, per
//! message, status recipients, reply preview and reactions.

use std::collections::HashMap;

use rusqlite::Connection;

use murmur_types::models::{ConversationDetail, Message, MessageView, ReplyPreview};

use crate::conversations::require_conversation;
use crate::members::{member_count_in, require_member};
use crate::messages::query_messages;
use crate::reactions::reactions_in_conversation;
use crate::statuses::statuses_in_conversation;
use crate::users::query_peer;
use crate::{Database, Result};

impl Database {
    /// Everything a member needs to render a conversation. All parts are read
    /// under one connection lock, so the view is consistent.
    pub fn conversation_detail(&self, conversation_id: i64, viewer: &str) -> Result<ConversationDetail> {
        self.with_conn(|conn| {
            let conversation = require_conversation(conn, conversation_id)?;
            require_member(conn, viewer, conversation_id)?;

            let member_count = member_count_in(conn, conversation_id)?;
            let peer = if conversation.is_direct() {
                query_peer(conn, conversation_id, viewer)?
            } else {
                None
            };

            let messages = query_messages(conn, conversation_id)?;
            let usernames = sender_usernames(conn, conversation_id)?;
            let mut statuses = statuses_in_conversation(conn, conversation_id)?;
            let mut reactions = reactions_in_conversation(conn, conversation_id)?;

            let by_id: HashMap<i64, &Message> = messages.iter().map(|m| (m.id, m)).collect();
            let views = messages
                .iter()
                .map(|message| {
                    let mut delivered = Vec::new();
                    let mut seen = Vec::new();
                    for status in statuses.remove(&message.id).unwrap_or_default() {
                        if status.seen {
                            seen.push(status.user_id.clone());
                        }
                        if status.delivered {
                            delivered.push(status.user_id);
                        }
                    }

                    // A deleted reply target simply has no preview.
                    let reply_preview = message
                        .reply_to
                        .and_then(|id| by_id.get(&id))
                        .map(|target| ReplyPreview {
                            id: target.id,
                            content: target.content.clone(),
                        });

                    MessageView {
                        sender_username: usernames
                            .get(&message.sender_id)
                            .cloned()
                            .unwrap_or_default(),
                        delivered,
                        seen,
                        reply_preview,
                        reactions: reactions.remove(&message.id).unwrap_or_default(),
                        message: message.clone(),
                    }
                })
                .collect();

            Ok(ConversationDetail {
                conversation,
                member_count,
                peer,
                messages: views,
            })
        })
    }
}

/// Senders may have left the conversation since, so this goes through
/// `message` rather than `member`.
fn sender_usernames(conn: &Connection, conversation_id: i64) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT u.uuid, u.username
         FROM message m
         JOIN user u ON u.uuid = m.uuidSender
         WHERE m.idConversation = ?1",
    )?;
    let names = stmt
        .query_map([conversation_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<HashMap<String, String>, _>>()?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::testutil::seeded;
    use murmur_types::models::{MessageContent, NewMessage};

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
    fn direct_detail_has_peer_statuses_and_reply_preview() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();
        let question = db.create_message(&text(conv.id, "1", "lunch?")).unwrap();
        let answer = db
            .create_message(&NewMessage {
                reply_to: Some(question.id),
                ..text(conv.id, "2", "sure")
            })
            .unwrap();
        db.mark_seen("2", question.id).unwrap();
        db.add_reaction(answer.id, "1", "👍").unwrap();

        let detail = db.conversation_detail(conv.id, "1").unwrap();
        assert_eq!(detail.member_count, 2);
        assert_eq!(detail.peer.as_ref().map(|u| u.username.as_str()), Some("bob"));
        assert_eq!(detail.messages.len(), 2);

        let first = &detail.messages[0];
        assert_eq!(first.sender_username, "alice");
        assert_eq!(first.delivered, vec!["2"]);
        assert_eq!(first.seen, vec!["2"]);
        assert!(first.reply_preview.is_none());

        let second = &detail.messages[1];
        assert_eq!(second.sender_username, "bob");
        assert_eq!(second.delivered, vec!["1"]);
        assert!(second.seen.is_empty());
        let preview = second.reply_preview.as_ref().unwrap();
        assert_eq!(preview.id, question.id);
        assert_eq!(preview.content.text(), Some("lunch?"));
        assert_eq!(second.reactions.len(), 1);
        assert_eq!(second.reactions[0].username, "alice");
    }

    #[test]
    fn group_detail_has_no_peer() {
        let db = seeded();
        let (group, _) = db
            .create_group_with_members("1", "crew", None, &["2".to_string(), "3".to_string()])
            .unwrap();
        let detail = db.conversation_detail(group.id, "3").unwrap();
        assert_eq!(detail.member_count, 3);
        assert!(detail.peer.is_none());
        assert!(detail.messages.is_empty());
    }

    #[test]
    fn deleted_reply_target_drops_preview() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();
        let question = db.create_message(&text(conv.id, "1", "lunch?")).unwrap();
        db.create_message(&NewMessage {
            reply_to: Some(question.id),
            ..text(conv.id, "2", "sure")
        })
        .unwrap();
        db.delete_message(question.id, "1").unwrap();

        let detail = db.conversation_detail(conv.id, "2").unwrap();
        assert_eq!(detail.messages.len(), 1);
        assert_eq!(detail.messages[0].message.reply_to, Some(question.id));
        assert!(detail.messages[0].reply_preview.is_none());
    }

    #[test]
    fn former_members_still_have_names() {
        let db = seeded();
        let (group, _) = db
            .create_group_with_members("1", "crew", None, &["2".to_string()])
            .unwrap();
        db.create_message(&text(group.id, "2", "bye")).unwrap();
        db.leave_group("2", group.id).unwrap();

        let detail = db.conversation_detail(group.id, "1").unwrap();
        assert_eq!(detail.messages[0].sender_username, "bob");
    }

    #[test]
    fn outsiders_are_rejected() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();
        let err = db.conversation_detail(conv.id, "3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        let err = db.conversation_detail(999, "1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
