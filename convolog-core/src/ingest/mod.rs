//! Ingestion layer: from raw session logs to relational rows
//!
//! This module orchestrates one full batch pass over an assistant's data
//! directory, normalizing session logs and todo snapshots into the store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌─────────────────┐
//! │   Source Files   │ ──► │  SyncEngine  │ ──► │    Database     │
//! │ (~/.claude/...)  │     │              │     │ (projects, ...) │
//! └──────────────────┘     └──────────────┘     └─────────────────┘
//!                                │
//!                                ▼
//!                  ┌───────────────────────────┐
//!                  │ entry::parse_file         │
//!                  │ paths::project_info / ids │
//!                  │ grouping::group_tool_turns│
//!                  └───────────────────────────┘
//! ```
//!
//! ## Idempotency
//!
//! A sync pass may be repeated against the same files without duplicating
//! anything: projects and conversations are looked up by their unique keys
//! before insertion, messages are skipped when their uuid is already stored
//! (together with their tool uses), and todos are upserted wholesale by
//! (session_id, todo_id). This check-then-insert pattern is correct because
//! a sync run is the store's only writer.
//!
//! ## Failure model
//!
//! Work is fail-soft at file granularity: a file that cannot be read,
//! parsed, or written is logged, recorded in [`SyncReport::errors`], and the
//! run moves on. Only failure to list the top-level `projects` directory
//! aborts [`SyncEngine::sync_all`].

pub mod entry;
pub mod grouping;
pub mod paths;

use crate::db::{Database, NewMessage};
use crate::error::Result;
use crate::types::{MessageType, TodoSnapshot};
use chrono::{DateTime, Utc};
use entry::{AssistantBlock, LogEntry, UserContent};
use paths::ProjectInfo;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Result of a full sync pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Session log files that produced at least one valid entry
    pub files_processed: usize,
    /// Session log files skipped because they held no valid entries
    pub files_skipped: usize,
    /// Conversations created this pass
    pub conversations_created: usize,
    /// Conversations that already existed and were refreshed
    pub conversations_updated: usize,
    /// Messages inserted (resyncs insert none)
    pub messages_inserted: usize,
    /// Tool use rows inserted
    pub tool_uses_inserted: usize,
    /// Todo rows upserted
    pub todos_upserted: usize,
    /// Log lines rejected by the entry parser
    pub lines_rejected: usize,
    /// Per-file failures (file path → error message)
    pub errors: Vec<(PathBuf, String)>,
}

/// Result of syncing a single session log file.
#[derive(Debug, Default)]
pub struct FileReport {
    /// Path to the synced file
    pub path: PathBuf,
    /// Session id derived from the filename
    pub session_id: String,
    /// Messages inserted from this file
    pub messages_inserted: usize,
    /// Tool use rows inserted from this file
    pub tool_uses_inserted: usize,
    /// Lines rejected by the parser
    pub lines_rejected: usize,
    /// Whether this sync created the conversation row
    pub created_conversation: bool,
    /// File held no valid entries and nothing was persisted
    pub skipped: bool,
}

/// Drives one full ingestion pass over an assistant data directory.
///
/// The engine is synchronous and single-writer; see the module docs for the
/// idempotency and failure model.
pub struct SyncEngine {
    db: Database,
}

impl SyncEngine {
    /// Create an engine writing into the given database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the underlying database (for queries after a sync).
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Sync every project's session logs and every todo snapshot under
    /// `root`.
    ///
    /// Returns an error only when the top-level `projects` directory cannot
    /// be listed; all other failures are recorded in the report.
    pub fn sync_all(&self, root: &Path) -> Result<SyncReport> {
        tracing::info!(root = %root.display(), "Starting sync");
        let mut report = SyncReport::default();

        let projects_dir = root.join("projects");
        for dir_entry in std::fs::read_dir(&projects_dir)? {
            let dir_entry = match dir_entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable directory entry, skipping");
                    continue;
                }
            };
            let path = dir_entry.path();
            if path.is_dir() {
                self.sync_project_dir(&path, &mut report);
            }
        }

        self.sync_todos(&root.join("todos"), &mut report);

        tracing::info!(
            files = report.files_processed,
            messages = report.messages_inserted,
            todos = report.todos_upserted,
            rejected = report.lines_rejected,
            errors = report.errors.len(),
            "Sync completed"
        );
        Ok(report)
    }

    /// Sync every `*.jsonl` session log in one project directory.
    fn sync_project_dir(&self, dir: &Path, report: &mut SyncReport) {
        let pattern = dir.join("*.jsonl");
        let matches = match glob::glob(&pattern.to_string_lossy()) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!(dir = %dir.display(), error = %e, "Invalid glob pattern");
                report.errors.push((dir.to_path_buf(), e.to_string()));
                return;
            }
        };

        for path in matches.flatten() {
            match self.sync_conversation(&path) {
                Ok(file) => {
                    report.lines_rejected += file.lines_rejected;
                    if file.skipped {
                        report.files_skipped += 1;
                    } else {
                        report.files_processed += 1;
                        if file.created_conversation {
                            report.conversations_created += 1;
                        } else {
                            report.conversations_updated += 1;
                        }
                        report.messages_inserted += file.messages_inserted;
                        report.tool_uses_inserted += file.tool_uses_inserted;
                    }
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to sync conversation");
                    report.errors.push((path, e.to_string()));
                }
            }
        }
    }

    /// Sync one session log file into the store.
    pub fn sync_conversation(&self, path: &Path) -> Result<FileReport> {
        tracing::debug!(path = %path.display(), "Syncing conversation");

        let info = paths::project_info(path)?;
        let session_id = paths::session_id(path)?;
        let parsed = entry::parse_file(path)?;

        let mut report = FileReport {
            path: path.to_path_buf(),
            session_id: session_id.clone(),
            lines_rejected: parsed.rejected,
            ..FileReport::default()
        };
        if parsed.rejected > 0 {
            tracing::warn!(
                path = %path.display(),
                rejected = parsed.rejected,
                "Rejected log lines during parse"
            );
        }
        if parsed.entries.is_empty() {
            tracing::warn!(path = %path.display(), "No valid entries found, skipping file");
            report.skipped = true;
            return Ok(report);
        }

        let project_id = self.get_or_create_project(&info)?;

        // Conversation time bounds: earliest and latest timestamp among
        // entries that carry one. Summary entries carry none.
        let mut started_at: Option<DateTime<Utc>> = None;
        let mut ended_at: Option<DateTime<Utc>> = None;
        for log_entry in &parsed.entries {
            if let Some(ts) = log_entry.timestamp().and_then(parse_entry_timestamp) {
                started_at = Some(started_at.map_or(ts, |cur| cur.min(ts)));
                ended_at = Some(ended_at.map_or(ts, |cur| cur.max(ts)));
            }
        }
        let summary = parsed.entries.iter().find_map(|log_entry| match log_entry {
            LogEntry::Summary(s) => Some(s.summary.clone()),
            _ => None,
        });

        let (conversation_id, created) = self.get_or_create_conversation(
            &session_id,
            project_id,
            started_at.unwrap_or_else(Utc::now),
            ended_at,
            summary.as_deref(),
        )?;
        report.created_conversation = created;

        // Tool results echoed by user entries, keyed by invocation id, so
        // each ToolUse row can carry the output of its invocation.
        let tool_results = collect_tool_results(&parsed.entries);

        let turns = grouping::group_tool_turns(parsed.entries);
        for turn in &turns {
            match turn {
                LogEntry::User(user) => {
                    if grouping::is_tool_result_echo(user) {
                        tracing::debug!(uuid = %user.uuid, "Skipping tool result echo");
                        continue;
                    }
                    if self.db.message_exists(&user.uuid)? {
                        continue;
                    }
                    let content = flatten_user_content(&user.message.content);
                    self.db.insert_message(&NewMessage {
                        uuid: &user.uuid,
                        conversation_id,
                        parent_uuid: user.parent_uuid.as_deref(),
                        message_type: MessageType::User,
                        role: user.message.role.as_deref(),
                        content: &content,
                        model: None,
                        timestamp: &user.timestamp,
                        is_sidechain: user.is_sidechain,
                        is_meta: user.is_meta,
                    })?;
                    report.messages_inserted += 1;
                }
                LogEntry::Assistant(assistant) => {
                    if self.db.message_exists(&assistant.uuid)? {
                        continue;
                    }
                    let content = flatten_assistant_content(&assistant.message.content);
                    let message_id = self.db.insert_message(&NewMessage {
                        uuid: &assistant.uuid,
                        conversation_id,
                        parent_uuid: assistant.parent_uuid.as_deref(),
                        message_type: MessageType::Assistant,
                        role: assistant.message.role.as_deref(),
                        content: &content,
                        model: assistant.message.model.as_deref(),
                        timestamp: &assistant.timestamp,
                        is_sidechain: assistant.is_sidechain,
                        is_meta: false,
                    })?;
                    report.messages_inserted += 1;

                    for block in &assistant.message.content {
                        if let AssistantBlock::ToolUse { id, name, input } = block {
                            let input_json = serde_json::to_string(input)?;
                            self.db.insert_tool_use(
                                message_id,
                                id,
                                name,
                                &input_json,
                                tool_results.get(id).map(String::as_str),
                                &assistant.timestamp,
                            )?;
                            report.tool_uses_inserted += 1;
                        }
                    }
                }
                LogEntry::Summary(_) => {}
            }
        }

        Ok(report)
    }

    /// Sync every `*.json` todo snapshot in the todos directory.
    fn sync_todos(&self, dir: &Path, report: &mut SyncReport) {
        let pattern = dir.join("*.json");
        let matches = match glob::glob(&pattern.to_string_lossy()) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Invalid glob pattern");
                return;
            }
        };

        for path in matches.flatten() {
            match self.sync_todo_file(&path) {
                Ok(count) => report.todos_upserted += count,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to sync todo file");
                    report.errors.push((path, e.to_string()));
                }
            }
        }
    }

    /// Sync one todo snapshot file, returning how many todos were upserted.
    ///
    /// A resync fully replaces each item's row by (session_id, todo_id); a
    /// malformed item rejects only that item.
    pub fn sync_todo_file(&self, path: &Path) -> Result<usize> {
        let Some(session_id) = paths::todo_session_id(path) else {
            tracing::warn!(path = %path.display(), "Todo filename carries no session id, skipping");
            return Ok(0);
        };

        let content = std::fs::read_to_string(path)?;
        let items: Vec<serde_json::Value> = serde_json::from_str(&content)?;

        let mut upserted = 0;
        for item in items {
            match serde_json::from_value::<TodoSnapshot>(item) {
                Ok(todo) => {
                    self.db.upsert_todo(&session_id, &todo)?;
                    upserted += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping malformed todo");
                }
            }
        }

        Ok(upserted)
    }

    /// Resolve a project id by path, creating the row on first sight.
    ///
    /// The display name is written only at creation.
    fn get_or_create_project(&self, info: &ProjectInfo) -> Result<i64> {
        if let Some(existing) = self.db.get_project_by_path(&info.path)? {
            return Ok(existing.id);
        }
        tracing::info!(path = %info.path, name = %info.name, "Creating project");
        self.db.insert_project(&info.path, &info.name)
    }

    /// Resolve a conversation id by session id, creating or refreshing the
    /// row. Returns `(id, created)`.
    fn get_or_create_conversation(
        &self,
        session_id: &str,
        project_id: i64,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        summary: Option<&str>,
    ) -> Result<(i64, bool)> {
        if let Some(existing) = self.db.get_conversation_by_session(session_id)? {
            self.db
                .update_conversation_sync(existing.id, ended_at, summary)?;
            return Ok((existing.id, false));
        }
        let id = self
            .db
            .insert_conversation(session_id, project_id, started_at, ended_at, summary)?;
        Ok((id, true))
    }
}

/// Parse an entry's ISO-8601 timestamp string.
fn parse_entry_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Gather tool results echoed by user entries, keyed by invocation id.
///
/// The first result observed for an id wins; a tool runs once.
fn collect_tool_results(entries: &[LogEntry]) -> HashMap<String, String> {
    let mut results = HashMap::new();
    for log_entry in entries {
        let LogEntry::User(user) = log_entry else {
            continue;
        };
        let UserContent::Blocks(blocks) = &user.message.content else {
            continue;
        };
        for block in blocks {
            if let (Some(id), Some(text)) = (&block.tool_use_id, block_result_text(block)) {
                results.entry(id.clone()).or_insert(text);
            }
        }
    }
    results
}

/// Extract a result payload from a user content block as display text.
fn block_result_text(block: &entry::UserBlock) -> Option<String> {
    let payload = block.content.as_ref().or(block.tool_result.as_ref())?;
    match payload {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Flatten user content to display text: block texts joined by newline,
/// non-text blocks JSON-stringified.
fn flatten_user_content(content: &UserContent) -> String {
    match content {
        UserContent::Text(text) => text.clone(),
        UserContent::Blocks(blocks) => blocks
            .iter()
            .map(|block| match &block.text {
                Some(text) => text.clone(),
                None => serde_json::to_string(block).unwrap_or_default(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Flatten assistant content to display text: text blocks only, joined by
/// newline. Thinking blocks are never persisted.
fn flatten_assistant_content(blocks: &[AssistantBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            AssistantBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
