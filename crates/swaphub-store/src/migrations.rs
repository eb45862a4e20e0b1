use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- groups and group_members are owned by the main platform; swaphub
        -- reads them for the membership gate and never writes them.
        CREATE TABLE IF NOT EXISTS groups (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS group_members (
            group_id    TEXT NOT NULL REFERENCES groups(id),
            user_id     TEXT NOT NULL,
            role        TEXT NOT NULL DEFAULT 'member',
            PRIMARY KEY (group_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            group_id        TEXT NOT NULL REFERENCES groups(id),
            sender_id       TEXT NOT NULL,
            sender_name     TEXT NOT NULL,
            content         TEXT NOT NULL,
            message_type    TEXT NOT NULL DEFAULT 'text',
            reply_to_id     TEXT REFERENCES messages(id),
            created_at      TEXT NOT NULL,
            is_edited       INTEGER NOT NULL DEFAULT 0,
            edited_at       TEXT,
            is_deleted      INTEGER NOT NULL DEFAULT 0,
            deleted_at      TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_group
            ON messages(group_id, created_at);

        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        -- Grow-only: receipts are inserted, never removed.
        CREATE TABLE IF NOT EXISTS read_receipts (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            read_at     TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id                  TEXT PRIMARY KEY,
            room_id             TEXT NOT NULL UNIQUE,
            title               TEXT NOT NULL,
            created_by          TEXT NOT NULL,
            created_at          TEXT NOT NULL,
            canvas_data         TEXT,
            is_active           INTEGER NOT NULL DEFAULT 1,
            max_participants    INTEGER NOT NULL DEFAULT 10,
            is_public           INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS session_participants (
            session_id  TEXT NOT NULL REFERENCES sessions(id),
            user_id     TEXT NOT NULL,
            joined_at   TEXT NOT NULL,
            is_active   INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (session_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
