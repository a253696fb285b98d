//! Database repository layer
//!
//! Provides query and insert operations for all entity types.
//!
//! Writes are shaped for the sync engine's idempotency model: messages are
//! inserted only after a uuid existence check, todos are upserted wholesale
//! by their (session_id, todo_id) unique key, and conversations are updated
//! in place on resync. Reads are the contract consumed by the serving layer.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

/// A message about to be persisted, before it has a database id.
#[derive(Debug)]
pub struct NewMessage<'a> {
    /// Source entry uuid (unique across the store)
    pub uuid: &'a str,
    /// Owning conversation
    pub conversation_id: i64,
    /// Back-reference to a causally prior entry
    pub parent_uuid: Option<&'a str>,
    /// Kind of message
    pub message_type: MessageType,
    /// Role string from the source payload
    pub role: Option<&'a str>,
    /// Flattened text content
    pub content: &'a str,
    /// Model variant, assistant messages only
    pub model: Option<&'a str>,
    /// Raw ISO-8601 timestamp from the source entry
    pub timestamp: &'a str,
    pub is_sidechain: bool,
    pub is_meta: bool,
}

/// Row counts across all tables, used for health output and idempotence checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub projects: i64,
    pub conversations: i64,
    pub messages: i64,
    pub tool_uses: i64,
    pub todos: i64,
}

/// Parse a datetime stored by this layer or by SQLite's CURRENT_TIMESTAMP.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|naive| naive.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

/// Database handle (single connection, serialized behind a mutex)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Project operations
    // ============================================

    /// Insert a new project, returning its id.
    ///
    /// The name is only ever written here; resyncs never rename a project.
    pub fn insert_project(&self, path: &str, name: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO projects (path, name) VALUES (?1, ?2)",
            params![path, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a project by its encoded path segment
    pub fn get_project_by_path(&self, path: &str) -> Result<Option<Project>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"
            SELECT id, path, name, created_at, updated_at,
                   (SELECT COUNT(*) FROM conversations WHERE project_id = projects.id)
                       AS conversation_count
            FROM projects WHERE path = ?1
            "#,
            [path],
            Self::row_to_project,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List all projects with derived conversation counts, most recent first
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, path, name, created_at, updated_at,
                   (SELECT COUNT(*) FROM conversations WHERE project_id = projects.id)
                       AS conversation_count
            FROM projects
            ORDER BY updated_at DESC
            "#,
        )?;
        let rows = stmt.query_map([], Self::row_to_project)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        Ok(Project {
            id: row.get("id")?,
            path: row.get("path")?,
            name: row.get("name")?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
            conversation_count: row.get("conversation_count")?,
        })
    }

    // ============================================
    // Conversation operations
    // ============================================

    /// Insert a new conversation, returning its id
    pub fn insert_conversation(
        &self,
        session_id: &str,
        project_id: i64,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        summary: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO conversations (session_id, project_id, started_at, ended_at, summary)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                session_id,
                project_id,
                started_at.to_rfc3339(),
                ended_at.map(|t| t.to_rfc3339()),
                summary,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Overwrite the resync-visible fields of an existing conversation.
    ///
    /// `started_at` is deliberately untouched; only the trailing edge and
    /// summary move as a log file grows.
    pub fn update_conversation_sync(
        &self,
        id: i64,
        ended_at: Option<DateTime<Utc>>,
        summary: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE conversations
            SET ended_at = ?1, summary = ?2, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?3
            "#,
            params![ended_at.map(|t| t.to_rfc3339()), summary, id],
        )?;
        Ok(())
    }

    /// Get a conversation by session id
    pub fn get_conversation_by_session(&self, session_id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"
            SELECT id, session_id, project_id, started_at, ended_at, summary,
                   (SELECT COUNT(*) FROM messages WHERE conversation_id = conversations.id)
                       AS message_count
            FROM conversations WHERE session_id = ?1
            "#,
            [session_id],
            Self::row_to_conversation,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List a project's conversations, most recently active first
    pub fn list_conversations(&self, project_id: i64) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, session_id, project_id, started_at, ended_at, summary,
                   (SELECT COUNT(*) FROM messages WHERE conversation_id = conversations.id)
                       AS message_count
            FROM conversations
            WHERE project_id = ?1
            ORDER BY ended_at DESC
            "#,
        )?;
        let rows = stmt.query_map([project_id], Self::row_to_conversation)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
        let started_at: String = row.get("started_at")?;
        let ended_at: Option<String> = row.get("ended_at")?;

        Ok(Conversation {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            project_id: row.get("project_id")?,
            started_at: parse_datetime(&started_at),
            ended_at: ended_at.as_deref().map(parse_datetime),
            summary: row.get("summary")?,
            message_count: row.get("message_count")?,
        })
    }

    // ============================================
    // Message operations
    // ============================================

    /// Check whether a message with this uuid is already stored
    pub fn message_exists(&self, uuid: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row("SELECT id FROM messages WHERE uuid = ?1", [uuid], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a message, returning its id
    pub fn insert_message(&self, message: &NewMessage) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO messages
                (uuid, conversation_id, parent_uuid, type, role, content, model,
                 timestamp, is_sidechain, is_meta)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                message.uuid,
                message.conversation_id,
                message.parent_uuid,
                message.message_type.as_str(),
                message.role,
                message.content,
                message.model,
                message.timestamp,
                message.is_sidechain,
                message.is_meta,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a conversation's messages in chronological order, each with its
    /// tool uses ordered by timestamp
    pub fn get_messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        let mut messages = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                r#"
                SELECT id, uuid, conversation_id, parent_uuid, type, role, content,
                       model, timestamp, is_sidechain, is_meta
                FROM messages
                WHERE conversation_id = ?1
                ORDER BY timestamp ASC, id ASC
                "#,
            )?;
            let rows = stmt.query_map([conversation_id], Self::row_to_message)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        for message in &mut messages {
            message.tool_uses = self.get_message_tool_uses(message.id)?;
        }

        Ok(messages)
    }

    /// Get the tool uses owned by one message, ordered by timestamp
    pub fn get_message_tool_uses(&self, message_id: i64) -> Result<Vec<ToolUse>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, message_id, tool_id, tool_name, input, result, timestamp
            FROM tool_uses
            WHERE message_id = ?1
            ORDER BY timestamp ASC, id ASC
            "#,
        )?;
        let rows = stmt.query_map([message_id], Self::row_to_tool_use)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
        let type_str: String = row.get("type")?;
        let timestamp: String = row.get("timestamp")?;

        Ok(Message {
            id: row.get("id")?,
            uuid: row.get("uuid")?,
            conversation_id: row.get("conversation_id")?,
            parent_uuid: row.get("parent_uuid")?,
            message_type: type_str.parse().unwrap_or(MessageType::System),
            role: row.get("role")?,
            content: row.get("content")?,
            model: row.get("model")?,
            timestamp: parse_datetime(&timestamp),
            is_sidechain: row.get("is_sidechain")?,
            is_meta: row.get("is_meta")?,
            tool_uses: Vec::new(),
        })
    }

    // ============================================
    // ToolUse operations
    // ============================================

    /// Insert a tool use row, returning its id
    pub fn insert_tool_use(
        &self,
        message_id: i64,
        tool_id: &str,
        tool_name: &str,
        input: &str,
        result: Option<&str>,
        timestamp: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO tool_uses (message_id, tool_id, tool_name, input, result, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![message_id, tool_id, tool_name, input, result, timestamp],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn row_to_tool_use(row: &Row) -> rusqlite::Result<ToolUse> {
        let timestamp: String = row.get("timestamp")?;

        Ok(ToolUse {
            id: row.get("id")?,
            message_id: row.get("message_id")?,
            tool_id: row.get("tool_id")?,
            tool_name: row.get("tool_name")?,
            input: row.get("input")?,
            result: row.get("result")?,
            timestamp: parse_datetime(&timestamp),
        })
    }

    // ============================================
    // Todo operations
    // ============================================

    /// Upsert a todo by (session_id, todo_id), replacing every column
    pub fn upsert_todo(&self, session_id: &str, todo: &TodoSnapshot) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO todos (session_id, todo_id, content, status, priority)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(session_id, todo_id) DO UPDATE SET
                content = excluded.content,
                status = excluded.status,
                priority = excluded.priority,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                session_id,
                todo.id,
                todo.content,
                todo.status.as_str(),
                todo.priority.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Get a session's todos, highest priority first
    pub fn todos_for_session(&self, session_id: &str) -> Result<Vec<Todo>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, session_id, todo_id, content, status, priority
            FROM todos
            WHERE session_id = ?1
            ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END,
                     created_at ASC
            "#,
        )?;
        let rows = stmt.query_map([session_id], Self::row_to_todo)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    fn row_to_todo(row: &Row) -> rusqlite::Result<Todo> {
        let status: String = row.get("status")?;
        let priority: String = row.get("priority")?;

        Ok(Todo {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            todo_id: row.get("todo_id")?,
            content: row.get("content")?,
            status: status.parse().unwrap_or(TodoStatus::Pending),
            priority: priority.parse().unwrap_or(TodoPriority::Low),
        })
    }

    // ============================================
    // Search
    // ============================================

    /// Full-text search over message content.
    ///
    /// The query string is passed to FTS5 as-is, so callers may use MATCH
    /// syntax (phrases, prefixes) directly.
    pub fn search_messages(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT m.id, m.uuid, m.conversation_id, m.parent_uuid, m.type, m.role,
                   m.content, m.model, m.timestamp, m.is_sidechain, m.is_meta,
                   c.session_id, p.id AS project_id, p.name AS project_name
            FROM messages_fts f
            JOIN messages m ON m.id = f.rowid
            JOIN conversations c ON c.id = m.conversation_id
            JOIN projects p ON p.id = c.project_id
            WHERE messages_fts MATCH ?1
            ORDER BY rank
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![query, limit as i64], |row| {
            Ok(SearchHit {
                message: Self::row_to_message(row)?,
                session_id: row.get("session_id")?,
                project_id: row.get("project_id")?,
                project_name: row.get("project_name")?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    // ============================================
    // Stats
    // ============================================

    /// Count rows across all tables
    pub fn row_counts(&self) -> Result<RowCounts> {
        let conn = self.conn.lock().unwrap();
        let count = |table: &str| -> rusqlite::Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        };
        Ok(RowCounts {
            projects: count("projects")?,
            conversations: count("conversations")?,
            messages: count("messages")?,
            tool_uses: count("tool_uses")?,
            todos: count("todos")?,
        })
    }
}
