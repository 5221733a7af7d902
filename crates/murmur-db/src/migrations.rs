use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE user (
                uuid        TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                photoUrl    TEXT
            );

            -- directLow/directHigh hold the two member ids in sorted order so that
            -- at most one direct conversation exists per unordered pair.
            CREATE TABLE conversation (
                id                      INTEGER PRIMARY KEY AUTOINCREMENT,
                isDirect                INTEGER NOT NULL,
                directLow               TEXT,
                directHigh              TEXT,
                groupName               TEXT,
                groupPhoto              TEXT,
                timestampCreated        TEXT NOT NULL,
                timestampLastMessage    TEXT NOT NULL,
                UNIQUE (directLow, directHigh),
                CHECK ((isDirect = 1 AND directLow IS NOT NULL AND directLow < directHigh
                            AND groupName IS NULL AND groupPhoto IS NULL)
                    OR (isDirect = 0 AND directLow IS NULL AND directHigh IS NULL
                            AND groupName IS NOT NULL))
            );

            CREATE TABLE member (
                uuidUser        TEXT NOT NULL REFERENCES user(uuid),
                idConversation  INTEGER NOT NULL REFERENCES conversation(id) ON DELETE CASCADE,
                timestampJoined TEXT NOT NULL,
                UNIQUE (uuidUser, idConversation)
            );

            CREATE INDEX idx_member_conversation ON member(idConversation);

            -- idRepliesTo / idForwardedFrom may dangle once the target is deleted.
            CREATE TABLE message (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                type            TEXT NOT NULL CHECK (type IN ('text', 'photo')),
                content         TEXT NOT NULL DEFAULT '',
                mediaUrl        TEXT,
                timestamp       TEXT NOT NULL,
                idConversation  INTEGER NOT NULL REFERENCES conversation(id) ON DELETE CASCADE,
                uuidSender      TEXT NOT NULL REFERENCES user(uuid),
                idRepliesTo     INTEGER,
                idForwardedFrom INTEGER,
                CHECK ((type = 'text' AND content <> '' AND mediaUrl IS NULL)
                    OR (type = 'photo' AND content = '' AND mediaUrl IS NOT NULL AND mediaUrl <> ''))
            );

            CREATE INDEX idx_message_conversation ON message(idConversation, timestamp, id);

            CREATE TABLE messageStatus (
                uuidUser    TEXT NOT NULL REFERENCES user(uuid),
                idMessage   INTEGER NOT NULL REFERENCES message(id) ON DELETE CASCADE,
                delivered   INTEGER NOT NULL DEFAULT 0,
                seen        INTEGER NOT NULL DEFAULT 0,
                UNIQUE (uuidUser, idMessage),
                CHECK (seen = 0 OR delivered = 1)
            );

            CREATE INDEX idx_status_message ON messageStatus(idMessage);

            CREATE TABLE reaction (
                uuidUser    TEXT NOT NULL REFERENCES user(uuid),
                idMessage   INTEGER NOT NULL REFERENCES message(id) ON DELETE CASCADE,
                emoji       TEXT NOT NULL CHECK (emoji <> ''),
                UNIQUE (uuidUser, idMessage)
            );

            CREATE INDEX idx_reaction_message ON reaction(idMessage);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
