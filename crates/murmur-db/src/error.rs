//! Structured store errors.
//!
//! Every store operation reports exactly one [`ErrorKind`]. SQLite constraint
//! failures are classified by their extended result code, never by message text.

use rusqlite::ErrorCode;
use rusqlite::ffi;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed or out-of-range input, rejected before any mutation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced entity is absent.
    #[error("{0} not found")]
    NotFound(String),

    /// Entity exists but the caller lacks membership or ownership.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Uniqueness violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Engine failure, transaction abort or I/O fault.
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Authorization,
    Conflict,
    Storage,
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Authorization(_) => ErrorKind::Authorization,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Replace the generic description of a classified constraint failure.
    pub(crate) fn describe_conflict(self, what: impl Into<String>) -> Self {
        match self {
            StoreError::Conflict(_) => StoreError::Conflict(what.into()),
            other => other,
        }
    }

    pub(crate) fn describe_not_found(self, what: impl Into<String>) -> Self {
        match self {
            StoreError::NotFound(_) => StoreError::NotFound(what.into()),
            other => other,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("row".into()),
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                match e.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        StoreError::Conflict("duplicate entry".into())
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                        StoreError::NotFound("referenced entity".into())
                    }
                    ffi::SQLITE_CONSTRAINT_CHECK | ffi::SQLITE_CONSTRAINT_NOTNULL => {
                        StoreError::Validation(err.to_string())
                    }
                    _ => StoreError::Storage(err.to_string()),
                }
            }
            _ => StoreError::Storage(err.to_string()),
        }
    }
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn unique_table() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k TEXT NOT NULL UNIQUE, n INTEGER CHECK (n > 0));")
            .unwrap();
        conn
    }

    #[test]
    fn unique_violation_is_conflict() {
        let conn = unique_table();
        conn.execute("INSERT INTO t (k, n) VALUES ('a', 1)", []).unwrap();
        let err: StoreError = conn
            .execute("INSERT INTO t (k, n) VALUES ('a', 2)", [])
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn check_violation_is_validation() {
        let conn = unique_table();
        let err: StoreError = conn
            .execute("INSERT INTO t (k, n) VALUES ('b', 0)", [])
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn missing_row_maps_to_none() {
        let conn = unique_table();
        let row: Option<i64> = conn
            .query_row("SELECT n FROM t WHERE k = 'zzz'", [], |r| r.get(0))
            .optional()
            .unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn describe_only_touches_matching_kind() {
        let err = StoreError::Storage("disk".into()).describe_conflict("taken");
        assert_eq!(err.kind(), ErrorKind::Storage);
        let err = StoreError::Conflict("duplicate entry".into()).describe_conflict("taken");
        assert_eq!(err.to_string(), "conflict: taken");
    }
}
