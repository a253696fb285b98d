//! Core domain types for convolog
//!
//! These types represent the canonical relational model that session logs are
//! normalized into.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Project** | A codebase the assistant worked on, identified by its on-disk path |
//! | **Conversation** | One session log file's worth of dialogue, identified by session id |
//! | **Message** | One persisted conversational turn (after tool-burst grouping) |
//! | **ToolUse** | One tool invocation made by an assistant Message |
//! | **Todo** | One item from a session's todo snapshot file |
//!
//! A Message is the *output* of the turn grouper, not a 1:1 mapping of log
//! lines: bursts of tool-bearing assistant entries collapse into a single
//! Message owning several ToolUse rows, and user entries that merely echo a
//! tool's result are never persisted at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Project
// ============================================

/// A codebase the assistant worked on.
///
/// Identity is the encoded on-disk path segment (unique). The display name is
/// derived from it at creation time and never rewritten afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Database ID (auto-incremented)
    pub id: i64,
    /// Encoded on-disk path segment, e.g. "-home-dev-myproject"
    pub path: String,
    /// Human-readable name, e.g. "home/dev/myproject"
    pub name: String,
    /// When this project row was created
    pub created_at: DateTime<Utc>,
    /// When this project row was last touched
    pub updated_at: DateTime<Utc>,
    /// Number of conversations under this project (derived at query time)
    pub conversation_count: i64,
}

// ============================================
// Conversation
// ============================================

/// One session's dialogue, identified by its session id.
///
/// `ended_at` and `summary` are overwritten on every sync with the latest
/// observed values; `started_at` is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Database ID (auto-incremented)
    pub id: i64,
    /// Session identifier from the log filename (unique)
    pub session_id: String,
    /// Owning project
    pub project_id: i64,
    /// Earliest entry timestamp observed
    pub started_at: DateTime<Utc>,
    /// Latest entry timestamp observed
    pub ended_at: Option<DateTime<Utc>>,
    /// Summary text, if the log contained a summary entry
    pub summary: Option<String>,
    /// Number of messages (derived at query time)
    pub message_count: i64,
}

// ============================================
// Messages
// ============================================

/// Kind of persisted message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    Assistant,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::Assistant => "assistant",
            MessageType::System => "system",
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageType::User),
            "assistant" => Ok(MessageType::Assistant),
            "system" => Ok(MessageType::System),
            _ => Err(format!("unknown message type: {}", s)),
        }
    }
}

/// A persisted conversational turn.
///
/// Identity is the source entry's `uuid`; inserting the same uuid twice is a
/// no-op, which is what makes re-syncing a log file safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Database ID (auto-incremented)
    pub id: i64,
    /// Globally unique id of the source log entry
    pub uuid: String,
    /// Owning conversation
    pub conversation_id: i64,
    /// Back-reference to a causally prior entry, if any
    pub parent_uuid: Option<String>,
    /// Kind of message
    pub message_type: MessageType,
    /// Role string from the source payload ("user", "assistant")
    pub role: Option<String>,
    /// Flattened text content
    pub content: String,
    /// Model variant, assistant messages only
    pub model: Option<String>,
    /// Entry timestamp
    pub timestamp: DateTime<Utc>,
    /// Entry belonged to a non-primary reasoning branch
    pub is_sidechain: bool,
    /// Entry was flagged as meta by the producer
    pub is_meta: bool,
    /// Tool invocations owned by this message, ordered by timestamp.
    /// Populated by read queries; empty on freshly-constructed values.
    pub tool_uses: Vec<ToolUse>,
}

/// One tool invocation made by an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUse {
    /// Database ID (auto-incremented)
    pub id: i64,
    /// Owning message
    pub message_id: i64,
    /// Invocation id from the source content block
    pub tool_id: String,
    /// Tool name, e.g. "Bash"
    pub tool_name: String,
    /// Serialized JSON input
    pub input: String,
    /// Result text echoed back by the tool runner, if observed
    pub result: Option<String>,
    /// Timestamp of the invoking entry
    pub timestamp: DateTime<Utc>,
}

// ============================================
// Todos
// ============================================

/// Status of a todo item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in_progress",
            TodoStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for TodoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TodoStatus::Pending),
            "in_progress" => Ok(TodoStatus::InProgress),
            "completed" => Ok(TodoStatus::Completed),
            _ => Err(format!("unknown todo status: {}", s)),
        }
    }
}

/// Priority of a todo item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    Low,
    Medium,
    High,
}

impl TodoPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoPriority::Low => "low",
            TodoPriority::Medium => "medium",
            TodoPriority::High => "high",
        }
    }
}

impl std::str::FromStr for TodoPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TodoPriority::Low),
            "medium" => Ok(TodoPriority::Medium),
            "high" => Ok(TodoPriority::High),
            _ => Err(format!("unknown todo priority: {}", s)),
        }
    }
}

/// One persisted todo row, keyed by (session_id, todo_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    /// Database ID (auto-incremented)
    pub id: i64,
    /// Session this todo belongs to
    pub session_id: String,
    /// Item id within the snapshot file
    pub todo_id: String,
    /// Item text
    pub content: String,
    /// Current status
    pub status: TodoStatus,
    /// Priority
    pub priority: TodoPriority,
}

/// One item as it appears in a todo snapshot file.
///
/// Snapshot files are JSON arrays of these; a resync fully replaces each
/// item's row by (session_id, id).
#[derive(Debug, Clone, Deserialize)]
pub struct TodoSnapshot {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    pub priority: TodoPriority,
}

// ============================================
// Search
// ============================================

/// A full-text search hit with its surrounding context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matching message
    pub message: Message,
    /// Session id of the owning conversation
    pub session_id: String,
    /// Owning project id
    pub project_id: i64,
    /// Owning project display name
    pub project_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_todo_status_round_trip() {
        for status in [
            TodoStatus::Pending,
            TodoStatus::InProgress,
            TodoStatus::Completed,
        ] {
            assert_eq!(TodoStatus::from_str(status.as_str()), Ok(status));
        }
        assert!(TodoStatus::from_str("done").is_err());
    }

    #[test]
    fn test_todo_priority_round_trip() {
        for priority in [TodoPriority::Low, TodoPriority::Medium, TodoPriority::High] {
            assert_eq!(TodoPriority::from_str(priority.as_str()), Ok(priority));
        }
        assert!(TodoPriority::from_str("urgent").is_err());
    }

    #[test]
    fn test_message_type_round_trip() {
        for mt in [
            MessageType::User,
            MessageType::Assistant,
            MessageType::System,
        ] {
            assert_eq!(MessageType::from_str(mt.as_str()), Ok(mt));
        }
        assert!(MessageType::from_str("tool").is_err());
    }

    #[test]
    fn test_todo_snapshot_deserializes() {
        let snapshot: TodoSnapshot = serde_json::from_str(
            r#"{"id":"1","content":"write tests","status":"in_progress","priority":"high"}"#,
        )
        .unwrap();
        assert_eq!(snapshot.status, TodoStatus::InProgress);
        assert_eq!(snapshot.priority, TodoPriority::High);
    }
}
