use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS walls (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS members (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS wall_members (
            wall_id     TEXT NOT NULL REFERENCES walls(id),
            member_id   TEXT NOT NULL REFERENCES members(id),
            joined_at   TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (wall_id, member_id)
        );

        -- Single-target invariant: one edge per (wall, source).
        CREATE TABLE IF NOT EXISTS crush_edges (
            wall_id     TEXT NOT NULL REFERENCES walls(id),
            source_id   TEXT NOT NULL REFERENCES members(id),
            target_id   TEXT NOT NULL REFERENCES members(id),
            set_at      TEXT NOT NULL,
            PRIMARY KEY (wall_id, source_id)
        );

        CREATE INDEX IF NOT EXISTS idx_crush_target
            ON crush_edges(wall_id, target_id);

        -- member_a < member_b, so both directions of a pair land on one row.
        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            wall_id     TEXT NOT NULL REFERENCES walls(id),
            member_a    TEXT NOT NULL REFERENCES members(id),
            member_b    TEXT NOT NULL REFERENCES members(id),
            created_at  TEXT NOT NULL,
            UNIQUE (wall_id, member_a, member_b)
        );

        CREATE TABLE IF NOT EXISTS conversation_messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT REFERENCES members(id),
            body            TEXT NOT NULL,
            is_system       INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON conversation_messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS relationship_status (
            conversation_id TEXT PRIMARY KEY REFERENCES conversations(id),
            stage           TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS confessions (
            id          TEXT PRIMARY KEY,
            wall_id     TEXT NOT NULL REFERENCES walls(id),
            author_id   TEXT NOT NULL REFERENCES members(id),
            body        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_confessions_wall
            ON confessions(wall_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
