use rusqlite::{Connection, params};
use tracing::info;
use uuid::Uuid;

use murmur_types::models::User;

use crate::error::OptionalExt;
use crate::models::{USER_COLUMNS, user_from_row};
use crate::{Database, Result, StoreError};

impl Database {
    pub fn create_user(&self, id: &str, username: &str, photo_url: Option<&str>) -> Result<User> {
        self.with_conn(|conn| insert_user(conn, id, username, photo_url))
    }

    /// Return the user with this exact name, creating it on first login.
    /// The flag is `true` when the user was just created.
    pub fn login(&self, username: &str) -> Result<(User, bool)> {
        self.with_conn(|conn| {
            if let Some(user) = query_user_by_username(conn, username)? {
                return Ok((user, false));
            }
            let id = Uuid::new_v4().to_string();
            let user = insert_user(conn, &id, username, None)?;
            info!("Registered user {} ({})", user.username, user.id);
            Ok((user, true))
        })
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        self.with_conn(|conn| {
            query_user(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("user {}", id)))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM user WHERE uuid = ?1)",
                [id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn set_username(&self, id: &str, username: &str) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn
                .execute("UPDATE user SET username = ?1 WHERE uuid = ?2", params![username, id])
                .map_err(|e| {
                    StoreError::from(e)
                        .describe_conflict(format!("username '{}' is already taken", username))
                })?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("user {}", id)));
            }
            Ok(())
        })
    }

    pub fn set_user_photo(&self, id: &str, photo_url: &str) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE user SET photoUrl = ?1 WHERE uuid = ?2",
                params![photo_url, id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("user {}", id)));
            }
            Ok(())
        })
    }

    /// Users whose name starts with `prefix`, ordered by name.
    pub fn search_users(&self, prefix: &str) -> Result<Vec<User>> {
        let pattern = format!("{}%", escape_like(prefix));
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM user WHERE username LIKE ?1 ESCAPE '\\' ORDER BY username",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let users = stmt
                .query_map([pattern], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM user ORDER BY username", USER_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let users = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }

    /// The other member of a direct conversation.
    pub fn peer_of(&self, conversation_id: i64, me: &str) -> Result<User> {
        self.with_conn(|conn| {
            query_peer(conn, conversation_id, me)?.ok_or_else(|| {
                StoreError::NotFound(format!("peer in conversation {}", conversation_id))
            })
        })
    }
}

fn insert_user(conn: &Connection, id: &str, username: &str, photo_url: Option<&str>) -> Result<User> {
    conn.execute(
        "INSERT INTO user (uuid, username, photoUrl) VALUES (?1, ?2, ?3)",
        params![id, username, photo_url],
    )
    .map_err(|e| StoreError::from(e).describe_conflict(format!("user '{}' already exists", username)))?;

    Ok(User {
        id: id.to_string(),
        username: username.to_string(),
        photo_url: photo_url.map(str::to_string),
    })
}

pub(crate) fn query_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM user WHERE uuid = ?1", USER_COLUMNS);
    conn.query_row(&sql, [id], user_from_row).optional()
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM user WHERE username = ?1", USER_COLUMNS);
    conn.query_row(&sql, [username], user_from_row).optional()
}

pub(crate) fn query_peer(conn: &Connection, conversation_id: i64, me: &str) -> Result<Option<User>> {
    conn.query_row(
        "SELECT u.uuid, u.username, u.photoUrl
         FROM member m
         JOIN user u ON u.uuid = m.uuidUser
         WHERE m.idConversation = ?1 AND m.uuidUser <> ?2
         LIMIT 1",
        params![conversation_id, me],
        user_from_row,
    )
    .optional()
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
