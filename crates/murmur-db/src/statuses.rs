//! Per-recipient delivered/seen flags.
//!
//! Both upserts only ever flip a flag from false to true, and the schema
//! rejects `seen` without `delivered`. Rows belong to current members of the
//! message's conversation other than its sender.

use std::collections::HashMap;

use rusqlite::{Connection, params};

use murmur_types::models::MessageStatus;

use crate::error::OptionalExt;
use crate::members::require_member;
use crate::messages::require_message;
use crate::models::status_from_row;
use crate::{Database, Result, StoreError};

impl Database {
    pub fn mark_delivered(&self, user_id: &str, message_id: i64) -> Result<MessageStatus> {
        self.upsert_status(
            user_id,
            message_id,
            "INSERT INTO messageStatus (uuidUser, idMessage, delivered, seen)
             VALUES (?1, ?2, 1, 0)
             ON CONFLICT (uuidUser, idMessage) DO UPDATE SET delivered = 1",
        )
    }

    /// Seeing a message implies having received it, so both flags are set.
    pub fn mark_seen(&self, user_id: &str, message_id: i64) -> Result<MessageStatus> {
        self.upsert_status(
            user_id,
            message_id,
            "INSERT INTO messageStatus (uuidUser, idMessage, delivered, seen)
             VALUES (?1, ?2, 1, 1)
             ON CONFLICT (uuidUser, idMessage) DO UPDATE SET delivered = 1, seen = 1",
        )
    }

    pub fn get_status(&self, user_id: &str, message_id: i64) -> Result<MessageStatus> {
        self.with_conn(|conn| require_status(conn, user_id, message_id))
    }

    pub fn list_statuses(&self, message_id: i64) -> Result<Vec<MessageStatus>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT uuidUser, idMessage, delivered, seen FROM messageStatus WHERE idMessage = ?1",
            )?;
            let statuses = stmt
                .query_map([message_id], status_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(statuses)
        })
    }

    fn upsert_status(&self, user_id: &str, message_id: i64, sql: &str) -> Result<MessageStatus> {
        self.with_conn(|conn| {
            let message = require_message(conn, message_id)?;
            if message.sender_id == user_id {
                return Err(StoreError::Authorization(format!(
                    "{} sent message {} and has no status for it",
                    user_id, message_id
                )));
            }
            require_member(conn, user_id, message.conversation_id)?;

            conn.execute(sql, params![user_id, message_id])?;
            require_status(conn, user_id, message_id)
        })
    }
}

fn require_status(conn: &Connection, user_id: &str, message_id: i64) -> Result<MessageStatus> {
    conn.query_row(
        "SELECT uuidUser, idMessage, delivered, seen
         FROM messageStatus WHERE uuidUser = ?1 AND idMessage = ?2",
        params![user_id, message_id],
        status_from_row,
    )
    .optional()?
    .ok_or_else(|| {
        StoreError::NotFound(format!("status of message {} for {}", message_id, user_id))
    })
}

/// Statuses of every message in a conversation, keyed by message id.
pub(crate) fn statuses_in_conversation(
    conn: &Connection,
    conversation_id: i64,
) -> Result<HashMap<i64, Vec<MessageStatus>>> {
    let mut stmt = conn.prepare(
        "SELECT s.uuidUser, s.idMessage, s.delivered, s.seen
         FROM messageStatus s
         JOIN message m ON m.id = s.idMessage
         WHERE m.idConversation = ?1
         ORDER BY s.idMessage, s.uuidUser",
    )?;
    let mut by_message: HashMap<i64, Vec<MessageStatus>> = HashMap::new();
    let rows = stmt.query_map([conversation_id], status_from_row)?;
    for row in rows {
        let status = row?;
        by_message.entry(status.message_id).or_default().push(status);
    }
    Ok(by_message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::testutil::seeded;
    use murmur_types::models::{MessageContent, NewMessage};

    fn message_from_alice(db: &Database) -> i64 {
        let conv = db.create_direct("1", "2").unwrap();
        db.create_message(&NewMessage {
            conversation_id: conv.id,
            sender_id: "1".into(),
            content: MessageContent::Text {
                content: "hi".into(),
            },
            reply_to: None,
        })
        .unwrap()
        .id
    }

    #[test]
    fn seen_sticks_after_delivered() {
        let db = seeded();
        let msg = message_from_alice(&db);

        let status = db.mark_seen("2", msg).unwrap();
        assert!(status.delivered && status.seen);

        let status = db.mark_delivered("2", msg).unwrap();
        assert!(status.delivered && status.seen);
    }

    #[test]
    fn late_joiner_gets_a_row_on_first_mark() {
        let db = seeded();
        let conv = db.create_group("1", "crew", None).unwrap();
        let msg = db
            .create_message(&NewMessage {
                conversation_id: conv.id,
                sender_id: "1".into(),
                content: MessageContent::Text {
                    content: "before you came".into(),
                },
                reply_to: None,
            })
            .unwrap()
            .id;
        db.add_members(conv.id, "1", &["3".to_string()]).unwrap();
        assert_eq!(db.get_status("3", msg).unwrap_err().kind(), ErrorKind::NotFound);

        let status = db.mark_delivered("3", msg).unwrap();
        assert!(status.delivered && !status.seen);
        assert_eq!(db.list_statuses(msg).unwrap().len(), 1);
    }

    #[test]
    fn sender_cannot_mark_own_message() {
        let db = seeded();
        let msg = message_from_alice(&db);

        let err = db.mark_seen("1", msg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        let err = db.mark_delivered("1", msg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let statuses = db.list_statuses(msg).unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].user_id, "2");
    }

    #[test]
    fn outsiders_get_no_row() {
        let db = seeded();
        let msg = message_from_alice(&db);

        assert_eq!(db.mark_delivered("3", msg).unwrap_err().kind(), ErrorKind::Authorization);
        assert_eq!(db.mark_seen("4", msg).unwrap_err().kind(), ErrorKind::Authorization);
        assert_eq!(db.mark_seen("ghost", msg).unwrap_err().kind(), ErrorKind::Authorization);
        assert_eq!(db.list_statuses(msg).unwrap().len(), 1);
    }

    #[test]
    fn unknown_message_is_not_found() {
        let db = seeded();
        assert_eq!(db.mark_seen("2", 404).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(db.mark_delivered("ghost", 404).unwrap_err().kind(), ErrorKind::NotFound);
    }
}
