use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Users and events live in the core API; only their ids are stored here.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            event_id        TEXT NOT NULL,
            author_id       TEXT NOT NULL,
            author_name     TEXT NOT NULL,
            author_role     TEXT NOT NULL,
            parent_id       TEXT REFERENCES messages(id),
            content         TEXT NOT NULL,
            is_pinned       INTEGER NOT NULL DEFAULT 0,
            is_announcement INTEGER NOT NULL DEFAULT 0,
            is_deleted      INTEGER NOT NULL DEFAULT 0,
            score           INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_event
            ON messages(event_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_parent
            ON messages(parent_id);

        CREATE TABLE IF NOT EXISTS votes (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            value       INTEGER NOT NULL CHECK (value IN (-1, 0, 1)),
            updated_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_votes_user
            ON votes(user_id);

        CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            kind        TEXT NOT NULL,
            title       TEXT NOT NULL,
            message     TEXT NOT NULL,
            event_id    TEXT,
            read        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
