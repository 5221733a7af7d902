pub mod conversations;
pub mod detail;
pub mod error;
pub mod members;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod reactions;
pub mod statuses;
pub mod users;

pub use error::{ErrorKind, Result, StoreError};

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Process-wide store handle. Wrap it in an `Arc` and share it between handlers;
/// every operation takes the connection lock for its whole duration.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Storage(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Storage(format!("DB lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Run `f` inside a single write transaction. Commits on `Ok`; on `Err` the
    /// transaction is rolled back and the original error is returned.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            match f(&tx) {
                Ok(value) => {
                    tx.commit()?;
                    Ok(value)
                }
                Err(err) => {
                    // A failed rollback must not mask the error that caused it.
                    if let Err(rollback_err) = tx.rollback() {
                        warn!("Rollback failed after {}: {}", err, rollback_err);
                    }
                    Err(err)
                }
            }
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.transaction(|tx| {
            tx.execute(
                "INSERT INTO user (uuid, username) VALUES ('9', 'ghost')",
                [],
            )?;
            Err(StoreError::Validation("abort".into()))
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);
        assert!(!db.user_exists("9").unwrap());
    }

    #[test]
    fn transaction_commits_on_success() {
        let db = Database::open_in_memory().unwrap();
        db.transaction(|tx| {
            tx.execute(
                "INSERT INTO user (uuid, username) VALUES ('9', 'ghost')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        assert!(db.user_exists("9").unwrap());
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        {
            let db = Database::open(&path).unwrap();
            db.create_user("1", "alice", None).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_user("1").unwrap().username, "alice");
    }
}
