use rusqlite::{Connection, params};
use tracing::info;

use murmur_types::models::AddMembersOutcome;

use crate::conversations::{delete_if_empty_in, require_group};
use crate::error::OptionalExt;
use crate::models::{format_ts, now};
use crate::{Database, Result, StoreError};

impl Database {
    /// Add one membership. A pair that already exists is a `Conflict`; check
    /// [`Database::is_member`] first for a friendlier path.
    pub fn add_member(&self, user_id: &str, conversation_id: i64) -> Result<()> {
        let ts = format_ts(now());
        self.with_conn(|conn| insert_member(conn, user_id, conversation_id, &ts))
    }

    /// Removing a membership that does not exist is not an error.
    pub fn remove_member(&self, user_id: &str, conversation_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM member WHERE uuidUser = ?1 AND idConversation = ?2",
                params![user_id, conversation_id],
            )?;
            Ok(())
        })
    }

    pub fn is_member(&self, user_id: &str, conversation_id: i64) -> Result<bool> {
        self.with_conn(|conn| is_member_in(conn, user_id, conversation_id))
    }

    pub fn list_members(&self, conversation_id: i64) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT uuidUser FROM member WHERE idConversation = ?1")?;
            let members = stmt
                .query_map([conversation_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(members)
        })
    }

    pub fn member_count(&self, conversation_id: i64) -> Result<usize> {
        self.with_conn(|conn| member_count_in(conn, conversation_id))
    }

    pub fn joined_at(&self, user_id: &str, conversation_id: i64) -> Result<chrono::DateTime<chrono::Utc>> {
        self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT timestampJoined FROM member WHERE uuidUser = ?1 AND idConversation = ?2",
                    params![user_id, conversation_id],
                    |row| row.get(0),
                )
                .optional()?;
            let raw = raw.ok_or_else(|| {
                StoreError::NotFound(format!(
                    "membership of {} in conversation {}",
                    user_id, conversation_id
                ))
            })?;
            chrono::DateTime::parse_from_rfc3339(&raw)
                .map(|ts| ts.with_timezone(&chrono::Utc))
                .map_err(|e| StoreError::Storage(format!("corrupt timestampJoined '{}': {}", raw, e)))
        })
    }

    /// Add several users to a group on behalf of `requester`, who must already
    /// be a member. Users that are already members are reported, not re-added.
    pub fn add_members(
        &self,
        conversation_id: i64,
        requester: &str,
        user_ids: &[String],
    ) -> Result<AddMembersOutcome> {
        self.transaction(|tx| {
            require_group(tx, conversation_id)?;
            require_member(tx, requester, conversation_id)?;
            add_members_in(tx, conversation_id, user_ids)
        })
    }

    /// Remove `user_id` from a group and delete the group once it is empty.
    /// Returns whether the conversation was deleted.
    pub fn leave_group(&self, user_id: &str, conversation_id: i64) -> Result<bool> {
        self.transaction(|tx| {
            require_group(tx, conversation_id)?;
            require_member(tx, user_id, conversation_id)?;

            tx.execute(
                "DELETE FROM member WHERE uuidUser = ?1 AND idConversation = ?2",
                params![user_id, conversation_id],
            )?;
            info!("User {} left conversation {}", user_id, conversation_id);

            delete_if_empty_in(tx, conversation_id)
        })
    }
}

pub(crate) fn insert_member(
    conn: &Connection,
    user_id: &str,
    conversation_id: i64,
    ts: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO member (uuidUser, idConversation, timestampJoined) VALUES (?1, ?2, ?3)",
        params![user_id, conversation_id, ts],
    )
    .map_err(|e| {
        StoreError::from(e)
            .describe_conflict(format!(
                "{} is already a member of conversation {}",
                user_id, conversation_id
            ))
            .describe_not_found(format!("user {} or conversation {}", user_id, conversation_id))
    })?;
    Ok(())
}

pub(crate) fn add_members_in(
    conn: &Connection,
    conversation_id: i64,
    user_ids: &[String],
) -> Result<AddMembersOutcome> {
    let ts = format_ts(now());
    let mut outcome = AddMembersOutcome::default();

    for user_id in user_ids {
        match insert_member(conn, user_id, conversation_id, &ts) {
            Ok(()) => outcome.added.push(user_id.clone()),
            Err(StoreError::Conflict(_)) => outcome.already_present.push(user_id.clone()),
            Err(e) => return Err(e),
        }
    }

    Ok(outcome)
}

pub(crate) fn is_member_in(conn: &Connection, user_id: &str, conversation_id: i64) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM member WHERE uuidUser = ?1 AND idConversation = ?2)",
        params![user_id, conversation_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Membership is the authorization gate for anything inside a conversation.
pub(crate) fn require_member(conn: &Connection, user_id: &str, conversation_id: i64) -> Result<()> {
    if !is_member_in(conn, user_id, conversation_id)? {
        return Err(StoreError::Authorization(format!(
            "{} is not a member of conversation {}",
            user_id, conversation_id
        )));
    }
    Ok(())
}

pub(crate) fn member_count_in(conn: &Connection, conversation_id: i64) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM member WHERE idConversation = ?1",
        [conversation_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}
