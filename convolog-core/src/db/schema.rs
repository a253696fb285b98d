//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.
//!
//! The full-text index over message content is an FTS5 external-content
//! table kept consistent by triggers, so every code path that inserts,
//! updates, or deletes a message keeps the index correct without doing
//! anything itself.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    -- Projects table
    CREATE TABLE IF NOT EXISTS projects (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        path       TEXT UNIQUE NOT NULL,
        name       TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    -- Conversations table
    CREATE TABLE IF NOT EXISTS conversations (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT UNIQUE NOT NULL,
        project_id INTEGER NOT NULL REFERENCES projects(id),
        started_at DATETIME NOT NULL,
        ended_at   DATETIME,
        summary    TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    -- Messages table
    CREATE TABLE IF NOT EXISTS messages (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid            TEXT UNIQUE NOT NULL,
        conversation_id INTEGER NOT NULL REFERENCES conversations(id),
        parent_uuid     TEXT,
        type            TEXT NOT NULL CHECK (type IN ('user', 'assistant', 'system')),
        role            TEXT,
        content         TEXT NOT NULL,
        model           TEXT,
        timestamp       DATETIME NOT NULL,
        is_sidechain    BOOLEAN DEFAULT 0,
        is_meta         BOOLEAN DEFAULT 0,
        created_at      DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    -- Tool uses table
    CREATE TABLE IF NOT EXISTS tool_uses (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        message_id INTEGER NOT NULL REFERENCES messages(id),
        tool_id    TEXT NOT NULL,
        tool_name  TEXT NOT NULL,
        input      TEXT NOT NULL,
        result     TEXT,
        timestamp  DATETIME NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    -- Todos table
    CREATE TABLE IF NOT EXISTS todos (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        todo_id    TEXT NOT NULL,
        content    TEXT NOT NULL,
        status     TEXT NOT NULL CHECK (status IN ('pending', 'in_progress', 'completed')),
        priority   TEXT NOT NULL CHECK (priority IN ('low', 'medium', 'high')),
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(session_id, todo_id)
    );

    -- Indexes
    CREATE INDEX IF NOT EXISTS idx_conversations_session_id ON conversations(session_id);
    CREATE INDEX IF NOT EXISTS idx_conversations_project_id ON conversations(project_id);
    CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id);
    CREATE INDEX IF NOT EXISTS idx_messages_uuid ON messages(uuid);
    CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
    CREATE INDEX IF NOT EXISTS idx_messages_type ON messages(type);
    CREATE INDEX IF NOT EXISTS idx_tool_uses_message_id ON tool_uses(message_id);
    CREATE INDEX IF NOT EXISTS idx_todos_session_id ON todos(session_id);

    -- Full text search over message content
    CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
        content,
        content=messages,
        content_rowid=id
    );

    -- Triggers to keep the FTS index in step with the messages table
    CREATE TRIGGER IF NOT EXISTS messages_ai AFTER INSERT ON messages
    BEGIN
        INSERT INTO messages_fts(rowid, content) VALUES (new.id, new.content);
    END;

    CREATE TRIGGER IF NOT EXISTS messages_ad AFTER DELETE ON messages
    BEGIN
        INSERT INTO messages_fts(messages_fts, rowid, content) VALUES('delete', old.id, old.content);
    END;

    CREATE TRIGGER IF NOT EXISTS messages_au AFTER UPDATE ON messages
    BEGIN
        INSERT INTO messages_fts(messages_fts, rowid, content) VALUES('delete', old.id, old.content);
        INSERT INTO messages_fts(rowid, content) VALUES (new.id, new.content);
    END;
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        // Check version
        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = ["projects", "conversations", "messages", "tool_uses", "todos"];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_fts_index_tracks_inserts_and_deletes() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO projects (path, name) VALUES ('-home-dev-app', 'home/dev/app')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO conversations (session_id, project_id, started_at)
             VALUES ('s1', 1, '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO messages (uuid, conversation_id, type, content, timestamp)
             VALUES ('m1', 1, 'user', 'find the flux capacitor', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let hits: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages_fts WHERE messages_fts MATCH 'capacitor'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);

        conn.execute("DELETE FROM messages WHERE uuid = 'm1'", []).unwrap();
        let hits: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages_fts WHERE messages_fts MATCH 'capacitor'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 0);
    }

    #[test]
    fn test_message_uuid_unique() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO projects (path, name) VALUES ('-home-dev-app', 'home/dev/app')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO conversations (session_id, project_id, started_at)
             VALUES ('s1', 1, '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO messages (uuid, conversation_id, type, content, timestamp)
             VALUES ('m1', 1, 'user', 'hello', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO messages (uuid, conversation_id, type, content, timestamp)
             VALUES ('m1', 1, 'user', 'hello again', '2024-01-01T00:00:01Z')",
            [],
        );
        assert!(dup.is_err(), "duplicate uuid should violate uniqueness");
    }
}
