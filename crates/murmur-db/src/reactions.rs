use std::collections::HashMap;

use rusqlite::{Connection, params};
use tracing::debug;

use murmur_types::models::{Reaction, ReactionWithUser};

use crate::members::require_member;
use crate::messages::require_message;
use crate::models::{reaction_from_row, reaction_with_user_from_row};
use crate::{Database, Result, StoreError};

impl Database {
    /// Add the user's single reaction to a message. Any member of the message's
    /// conversation may react; a second reaction from the same user is a `Conflict`.
    pub fn add_reaction(&self, message_id: i64, user_id: &str, emoji: &str) -> Result<Reaction> {
        if emoji.is_empty() {
            return Err(StoreError::Validation("emoji must not be empty".into()));
        }

        self.with_conn(|conn| {
            let message = require_message(conn, message_id)?;
            require_member(conn, user_id, message.conversation_id)?;

            conn.execute(
                "INSERT INTO reaction (uuidUser, idMessage, emoji) VALUES (?1, ?2, ?3)",
                params![user_id, message_id, emoji],
            )
            .map_err(|e| {
                StoreError::from(e).describe_conflict(format!(
                    "{} already reacted to message {}",
                    user_id, message_id
                ))
            })?;

            debug!("Reaction {} added to message {} by {}", emoji, message_id, user_id);
            Ok(Reaction {
                user_id: user_id.to_string(),
                message_id,
                emoji: emoji.to_string(),
            })
        })
    }

    /// Returns whether a reaction was removed; removing nothing is not an error.
    pub fn remove_reaction(&self, message_id: i64, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM reaction WHERE idMessage = ?1 AND uuidUser = ?2",
                params![message_id, user_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn list_reactions(&self, message_id: i64) -> Result<Vec<Reaction>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT uuidUser, idMessage, emoji FROM reaction WHERE idMessage = ?1 ORDER BY rowid",
            )?;
            let reactions = stmt
                .query_map([message_id], reaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(reactions)
        })
    }

    pub fn list_reactions_with_users(&self, message_id: i64) -> Result<Vec<ReactionWithUser>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.uuidUser, u.username, r.emoji
                 FROM reaction r
                 JOIN user u ON u.uuid = r.uuidUser
                 WHERE r.idMessage = ?1
                 ORDER BY r.rowid",
            )?;
            let reactions = stmt
                .query_map([message_id], reaction_with_user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(reactions)
        })
    }
}

/// Batch-fetch the reactions of every message in a conversation, keyed by
/// message id, in one query instead of one per message.
pub(crate) fn reactions_in_conversation(
    conn: &Connection,
    conversation_id: i64,
) -> Result<HashMap<i64, Vec<ReactionWithUser>>> {
    let mut stmt = conn.prepare(
        "SELECT r.idMessage, r.uuidUser, u.username, r.emoji
         FROM reaction r
         JOIN message m ON m.id = r.idMessage
         JOIN user u ON u.uuid = r.uuidUser
         WHERE m.idConversation = ?1
         ORDER BY r.rowid",
    )?;

    let rows = stmt.query_map([conversation_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            ReactionWithUser {
                user_id: row.get(1)?,
                username: row.get(2)?,
                emoji: row.get(3)?,
            },
        ))
    })?;

    let mut by_message: HashMap<i64, Vec<ReactionWithUser>> = HashMap::new();
    for row in rows {
        let (message_id, reaction) = row?;
        by_message.entry(message_id).or_default().push(reaction);
    }
    Ok(by_message)
}
