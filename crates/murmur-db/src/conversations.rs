use rusqlite::{Connection, params};
use tracing::{debug, info};

use murmur_types::models::{
    AddMembersOutcome, Conversation, ConversationKind, ConversationSummary,
};

use crate::error::OptionalExt;
use crate::members::{add_members_in, insert_member};
use crate::messages::query_last_message;
use crate::models::{CONVERSATION_COLUMNS, conversation_from_row, format_ts, now};
use crate::users::query_peer;
use crate::{Database, Result, StoreError};

const MIN_GROUP_NAME_LEN: usize = 3;

impl Database {
    /// Create a direct conversation with exactly two members.
    ///
    /// At most one direct conversation exists per unordered pair of users; a
    /// second attempt fails with `Conflict` even when two requests race.
    pub fn create_direct(&self, user_a: &str, user_b: &str) -> Result<Conversation> {
        if user_a == user_b {
            return Err(StoreError::Validation(
                "a direct conversation needs two distinct users".into(),
            ));
        }

        let created_at = now();
        let ts = format_ts(created_at);
        let (low, high) = direct_pair(user_a, user_b);

        self.transaction(|tx| {
            tx.execute(
                "INSERT INTO conversation (isDirect, directLow, directHigh, timestampCreated, timestampLastMessage)
                 VALUES (1, ?1, ?2, ?3, ?3)",
                params![low, high, ts],
            )
            .map_err(|e| {
                StoreError::from(e).describe_conflict(format!(
                    "direct conversation between {} and {} already exists",
                    user_a, user_b
                ))
            })?;
            let id = tx.last_insert_rowid();

            insert_member(tx, user_a, id, &ts)?;
            insert_member(tx, user_b, id, &ts)?;

            info!("Direct conversation {} created for {} and {}", id, user_a, user_b);
            Ok(Conversation {
                id,
                kind: ConversationKind::Direct,
                created_at,
                last_message_at: created_at,
            })
        })
    }

    pub fn find_direct_between(&self, user_a: &str, user_b: &str) -> Result<Option<Conversation>> {
        let (low, high) = direct_pair(user_a, user_b);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM conversation c WHERE c.directLow = ?1 AND c.directHigh = ?2",
                CONVERSATION_COLUMNS
            );
            conn.query_row(&sql, params![low, high], conversation_from_row).optional()
        })
    }

    /// Create a group whose only member is its creator.
    pub fn create_group(
        &self,
        creator: &str,
        name: &str,
        photo: Option<&str>,
    ) -> Result<Conversation> {
        validate_group_name(name)?;
        self.transaction(|tx| insert_group(tx, creator, name, photo))
    }

    /// Create a group and add `members` in the same transaction. The creator is
    /// skipped if listed; repeated ids are reported as already present.
    pub fn create_group_with_members(
        &self,
        creator: &str,
        name: &str,
        photo: Option<&str>,
        members: &[String],
    ) -> Result<(Conversation, AddMembersOutcome)> {
        validate_group_name(name)?;
        self.transaction(|tx| {
            let conversation = insert_group(tx, creator, name, photo)?;
            let others: Vec<String> = members
                .iter()
                .filter(|id| id.as_str() != creator)
                .cloned()
                .collect();
            let outcome = add_members_in(tx, conversation.id, &others)?;
            Ok((conversation, outcome))
        })
    }

    pub fn get_conversation(&self, id: i64) -> Result<Conversation> {
        self.with_conn(|conn| require_conversation(conn, id))
    }

    /// Conversations the user belongs to, most recently active first.
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| query_conversations_for_user(conn, user_id))
    }

    /// Same order as [`Database::list_conversations`], with the last message and,
    /// for direct conversations, the other participant.
    pub fn list_conversation_summaries(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        self.with_conn(|conn| {
            let conversations = query_conversations_for_user(conn, user_id)?;
            let mut summaries = Vec::with_capacity(conversations.len());
            for conversation in conversations {
                let last_message = query_last_message(conn, conversation.id)?;
                let peer = if conversation.is_direct() {
                    query_peer(conn, conversation.id, user_id)?
                } else {
                    None
                };
                summaries.push(ConversationSummary {
                    conversation,
                    last_message,
                    peer,
                });
            }
            Ok(summaries)
        })
    }

    pub fn set_group_name(&self, id: i64, name: &str) -> Result<()> {
        validate_group_name(name)?;
        self.with_conn(|conn| {
            require_group(conn, id)?;
            conn.execute(
                "UPDATE conversation SET groupName = ?1 WHERE id = ?2",
                params![name, id],
            )?;
            Ok(())
        })
    }

    pub fn set_group_photo(&self, id: i64, photo: &str) -> Result<()> {
        self.with_conn(|conn| {
            require_group(conn, id)?;
            conn.execute(
                "UPDATE conversation SET groupPhoto = ?1 WHERE id = ?2",
                params![photo, id],
            )?;
            Ok(())
        })
    }

    /// Delete the conversation if nobody is left in it. Returns whether it was deleted.
    pub fn delete_if_empty(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| delete_if_empty_in(conn, id))
    }
}

/// The pair of direct conversation members in sorted order.
fn direct_pair<'a>(user_a: &'a str, user_b: &'a str) -> (&'a str, &'a str) {
    if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    }
}

fn validate_group_name(name: &str) -> Result<()> {
    if name.chars().count() < MIN_GROUP_NAME_LEN {
        return Err(StoreError::Validation(format!(
            "group name must be at least {} characters",
            MIN_GROUP_NAME_LEN
        )));
    }
    Ok(())
}

fn insert_group(
    conn: &Connection,
    creator: &str,
    name: &str,
    photo: Option<&str>,
) -> Result<Conversation> {
    let created_at = now();
    let ts = format_ts(created_at);

    conn.execute(
        "INSERT INTO conversation (isDirect, groupName, groupPhoto, timestampCreated, timestampLastMessage)
         VALUES (0, ?1, ?2, ?3, ?3)",
        params![name, photo, ts],
    )?;
    let id = conn.last_insert_rowid();
    insert_member(conn, creator, id, &ts)?;

    info!("Group {} '{}' created by {}", id, name, creator);
    Ok(Conversation {
        id,
        kind: ConversationKind::Group {
            name: name.to_string(),
            photo: photo.map(str::to_string),
        },
        created_at,
        last_message_at: created_at,
    })
}

pub(crate) fn query_conversation(conn: &Connection, id: i64) -> Result<Option<Conversation>> {
    let sql = format!("SELECT {} FROM conversation c WHERE c.id = ?1", CONVERSATION_COLUMNS);
    conn.query_row(&sql, [id], conversation_from_row).optional()
}

pub(crate) fn require_conversation(conn: &Connection, id: i64) -> Result<Conversation> {
    query_conversation(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("conversation {}", id)))
}

/// Fails with `NotFound` when absent and `Validation` for direct conversations.
pub(crate) fn require_group(conn: &Connection, id: i64) -> Result<Conversation> {
    let conversation = require_conversation(conn, id)?;
    if conversation.is_direct() {
        return Err(StoreError::Validation(format!(
            "conversation {} is a direct conversation",
            id
        )));
    }
    Ok(conversation)
}

fn query_conversations_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Conversation>> {
    let sql = format!(
        "SELECT {}
         FROM conversation c
         JOIN member m ON c.id = m.idConversation
         WHERE m.uuidUser = ?1
         ORDER BY c.timestampLastMessage DESC, c.id ASC",
        CONVERSATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let conversations = stmt
        .query_map([user_id], conversation_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(conversations)
}

/// Only ever moves the last-activity timestamp forward.
pub(crate) fn touch_last_activity(conn: &Connection, id: i64, ts: &str) -> Result<()> {
    conn.execute(
        "UPDATE conversation SET timestampLastMessage = ?1
         WHERE id = ?2 AND timestampLastMessage < ?1",
        params![ts, id],
    )?;
    Ok(())
}

pub(crate) fn delete_if_empty_in(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM conversation
         WHERE id = ?1 AND NOT EXISTS (SELECT 1 FROM member WHERE idConversation = ?1)",
        [id],
    )?;
    if deleted > 0 {
        debug!("Conversation {} deleted after its last member left", id);
    }
    Ok(deleted > 0)
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
    fn direct_pairs_do_not_collide_on_separators() {
        let db = seeded();
        for (id, name) in [
            ("a:b", "colon_left"),
            ("c", "plain_c"),
            ("a", "plain_a"),
            ("b:c", "colon_right"),
        ] {
            db.create_user(id, name, None).unwrap();
        }

        let first = db.create_direct("a:b", "c").unwrap();
        let second = db.create_direct("a", "b:c").unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(db.find_direct_between("c", "a:b").unwrap().unwrap().id, first.id);
        assert_eq!(db.find_direct_between("b:c", "a").unwrap().unwrap().id, second.id);
        assert!(db.find_direct_between("a", "c").unwrap().is_none());
    }

    #[test]
    fn direct_conversation_has_two_members() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();
        assert!(conv.is_direct());
        assert_eq!(conv.created_at, conv.last_message_at);

        let mut members = db.list_members(conv.id).unwrap();
        members.sort();
        assert_eq!(members, vec!["1", "2"]);
    }

    #[test]
    fn second_direct_conversation_for_pair_conflicts() {
        let db = seeded();
        let conv = db.create_direct("1", "2").unwrap();

        let err = db.create_direct("2", "1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let found = db.find_direct_between("2", "1").unwrap().unwrap();
        assert_eq!(found.id, conv.id);
        assert!(db.find_direct_between("1", "3").unwrap().is_none());
    }

    #[test]
    fn direct_with_self_is_rejected() {
        let db = seeded();
        assert_eq!(db.create_direct("1", "1").unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn direct_with_unknown_user_leaves_nothing_behind() {
        let db = seeded();
        let err = db.create_direct("1", "ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(db.list_conversations("1").unwrap().is_empty());
    }

    #[test]
    fn group_name_too_short_is_rejected() {
        let db = seeded();
        let err = db.create_group("1", "ab", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn group_with_members_collapses_duplicates() {
        let db = seeded();
        let members = vec!["2".to_string(), "3".to_string(), "2".to_string(), "1".to_string()];
        let (conv, outcome) = db
            .create_group_with_members("1", "friends", None, &members)
            .unwrap();

        assert_eq!(outcome.added, vec!["2", "3"]);
        assert_eq!(outcome.already_present, vec!["2"]);
        assert_eq!(db.member_count(conv.id).unwrap(), 3);
    }

    #[test]
    fn group_fields_are_group_only() {
        let db = seeded();
        let direct = db.create_direct("1", "2").unwrap();
        assert_eq!(
            db.set_group_name(direct.id, "renamed").unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            db.set_group_photo(direct.id, "/media/p.png").unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(db.set_group_name(999, "renamed").unwrap_err().kind(), ErrorKind::NotFound);

        let group = db.create_group("1", "friends", Some("/media/a.png")).unwrap();
        db.set_group_name(group.id, "family").unwrap();
        db.set_group_photo(group.id, "/media/b.png").unwrap();

        let updated = db.get_conversation(group.id).unwrap();
        assert_eq!(updated.group_name(), Some("family"));
        assert_eq!(updated.group_photo(), Some("/media/b.png"));
        assert_eq!(updated.last_message_at, group.last_message_at);
    }

    #[test]
    fn list_is_ordered_by_last_activity() {
        let db = seeded();
        let first = db.create_group("1", "first", None).unwrap();
        let second = db.create_group("1", "second", None).unwrap();
        let third = db.create_group("1", "third", None).unwrap();

        db.create_message(&text(first.id, "1", "bump")).unwrap();

        let ids: Vec<i64> = db.list_conversations("1").unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids[0], first.id);
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&second.id) && ids.contains(&third.id));
    }

    #[test]
    fn ties_break_by_id() {
        let db = seeded();
        let a = db.create_group("1", "aaa", None).unwrap();
        let b = db.create_group("1", "bbb", None).unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE conversation SET timestampLastMessage = '2024-01-01T00:00:00.000000Z'",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let ids: Vec<i64> = db.list_conversations("1").unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn touch_never_moves_backward() {
        let db = seeded();
        let group = db.create_group("1", "crew", None).unwrap();
        let before = db.get_conversation(group.id).unwrap().last_message_at;

        db.with_conn(|conn| touch_last_activity(conn, group.id, "2000-01-01T00:00:00.000000Z"))
            .unwrap();

        assert_eq!(db.get_conversation(group.id).unwrap().last_message_at, before);
    }

    #[test]
    fn delete_if_empty_keeps_populated_conversations() {
        let db = seeded();
        let group = db.create_group("1", "crew", None).unwrap();
        assert!(!db.delete_if_empty(group.id).unwrap());

        db.remove_member("1", group.id).unwrap();
        assert!(db.delete_if_empty(group.id).unwrap());
        assert_eq!(db.get_conversation(group.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn summaries_carry_last_message_and_peer() {
        let db = seeded();
        let direct = db.create_direct("1", "2").unwrap();
        db.create_message(&text(direct.id, "2", "hello")).unwrap();
        let group = db.create_group("1", "crew", None).unwrap();

        let summaries = db.list_conversation_summaries("1").unwrap();
        assert_eq!(summaries.len(), 2);

        let direct_summary = summaries.iter().find(|s| s.conversation.id == direct.id).unwrap();
        assert_eq!(direct_summary.peer.as_ref().unwrap().username, "bob");
        assert_eq!(
            direct_summary.last_message.as_ref().unwrap().content.text(),
            Some("hello")
        );

        let group_summary = summaries.iter().find(|s| s.conversation.id == group.id).unwrap();
        assert!(group_summary.peer.is_none());
        assert!(group_summary.last_message.is_none());
    }
}
