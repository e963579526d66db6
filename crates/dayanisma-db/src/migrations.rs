use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

// Timestamps are RFC 3339 strings with fixed microsecond precision and a
// `Z` suffix, so text comparison in SQL matches chronological order.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            display_name    TEXT NOT NULL,
            avatar_url      TEXT,
            presence        TEXT NOT NULL DEFAULT 'offline'
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            name            TEXT,
            kind            TEXT NOT NULL CHECK (kind IN ('direct', 'group')),
            created_by      TEXT NOT NULL,
            description     TEXT,
            avatar_url      TEXT,
            is_archived     INTEGER NOT NULL DEFAULT 0,
            last_message_at TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            user_id         TEXT NOT NULL,
            role            TEXT NOT NULL CHECK (role IN ('admin', 'member')),
            joined_at       TEXT NOT NULL,
            left_at         TEXT,
            is_muted        INTEGER NOT NULL DEFAULT 0,
            last_read_at    TEXT,
            PRIMARY KEY (conversation_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON conversation_participants(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL,
            content         TEXT NOT NULL DEFAULT '',
            kind            TEXT NOT NULL CHECK (kind IN ('text', 'image', 'file', 'system')),
            file_url        TEXT,
            file_name       TEXT,
            file_size       INTEGER,
            reply_to        TEXT REFERENCES messages(id),
            edited_at       TEXT,
            deleted_at      TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at, id);

        CREATE TABLE IF NOT EXISTS message_reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON message_reactions(message_id);

        CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            kind        TEXT NOT NULL,
            title       TEXT NOT NULL,
            body        TEXT NOT NULL,
            is_read     INTEGER NOT NULL DEFAULT 0,
            metadata    TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, is_read);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
