//! Session log entry parsing
//!
//! Each line of a session log file is one JSON object matching one of three
//! entry shapes, tagged by `type`: a user entry, an assistant entry, or a
//! summary entry.
//!
//! # Error Handling
//!
//! The parser is designed to be resilient and recover from errors:
//!
//! - **Malformed JSON lines**: Rejected with the JSON error, line skipped,
//!   parsing continues. The rejection is counted and recorded in
//!   [`ParsedLog::warnings`].
//!
//! - **Schema mismatches**: A line that is valid JSON but does not match any
//!   entry shape (missing required fields, unknown content block type) is
//!   rejected the same way. Rejections are never fatal to the file.
//!
//! - **Blank lines**: Silently skipped, not counted as rejections.
//!
//! Only I/O failure opening or reading the file itself returns an error.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

// ============================================
// Log entry types (serde deserialization)
// ============================================

/// One parsed line from a session log, tagged by its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogEntry {
    User(UserEntry),
    Assistant(AssistantEntry),
    Summary(SummaryEntry),
}

impl LogEntry {
    /// The entry's uuid, if this entry kind carries one.
    pub fn uuid(&self) -> Option<&str> {
        match self {
            LogEntry::User(e) => Some(&e.uuid),
            LogEntry::Assistant(e) => Some(&e.uuid),
            LogEntry::Summary(_) => None,
        }
    }

    /// The entry's timestamp string, if this entry kind carries one.
    pub fn timestamp(&self) -> Option<&str> {
        match self {
            LogEntry::User(e) => Some(&e.timestamp),
            LogEntry::Assistant(e) => Some(&e.timestamp),
            LogEntry::Summary(_) => None,
        }
    }
}

/// A user-authored entry (or a tool-result echo recorded under the user role).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntry {
    pub uuid: String,
    pub parent_uuid: Option<String>,
    pub session_id: String,
    /// ISO-8601 timestamp string
    pub timestamp: String,
    pub is_sidechain: bool,
    pub message: UserPayload,
    #[serde(default)]
    pub is_meta: bool,
}

/// The message body of a user entry.
#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub role: Option<String>,
    pub content: UserContent,
}

/// User content is either a plain string or an ordered block sequence.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Blocks(Vec<UserBlock>),
}

/// One block of user content.
///
/// The upstream format is loose here: blocks carry a `type` string plus
/// whichever of `text` / `tool_use_id` / result payload fields apply, so this
/// is a permissive struct rather than a tagged enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    /// Result payload under the `content` key (current format)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    /// Result payload under the `tool_result` key (older format)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<serde_json::Value>,
}

/// An assistant-authored entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantEntry {
    pub uuid: String,
    pub parent_uuid: Option<String>,
    pub session_id: String,
    /// ISO-8601 timestamp string
    pub timestamp: String,
    pub is_sidechain: bool,
    pub message: AssistantPayload,
}

impl AssistantEntry {
    /// Whether any content block is a tool invocation.
    pub fn has_tool_use(&self) -> bool {
        self.message
            .content
            .iter()
            .any(|block| matches!(block, AssistantBlock::ToolUse { .. }))
    }

    /// Whether the entry consists of thinking blocks and nothing else.
    pub fn is_thinking_only(&self) -> bool {
        !self.message.content.is_empty()
            && self
                .message
                .content
                .iter()
                .all(|block| matches!(block, AssistantBlock::Thinking { .. }))
    }
}

/// The message body of an assistant entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantPayload {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub content: Vec<AssistantBlock>,
}

/// One block of assistant content, tagged by `type`.
///
/// An unknown block type fails deserialization, rejecting the whole entry;
/// the upstream schema is a strict union here.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    Thinking {
        thinking: String,
    },
}

/// A summary entry pointing at the entry it summarizes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryEntry {
    pub summary: String,
    pub leaf_uuid: String,
}

// ============================================
// Line and file parsing
// ============================================

/// Why a line was rejected.
#[derive(Debug)]
pub enum RejectReason {
    /// The line is not valid JSON
    Json(serde_json::Error),
    /// The line is valid JSON but does not match any entry shape
    Schema(serde_json::Error),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Json(e) => write!(f, "JSON parse error: {}", e),
            RejectReason::Schema(e) => write!(f, "schema validation error: {}", e),
        }
    }
}

/// Result of parsing one whole log file.
///
/// Rejections are returned alongside the entries rather than tracked in
/// shared state, so the parser itself stays stateless.
#[derive(Debug, Default)]
pub struct ParsedLog {
    /// Successfully parsed entries, in file line order
    pub entries: Vec<LogEntry>,
    /// Number of non-blank lines that failed parsing or validation
    pub rejected: usize,
    /// One human-readable warning per rejected line
    pub warnings: Vec<String>,
}

/// Parse a single log line.
///
/// Returns `Ok(None)` for blank lines, `Ok(Some(entry))` for valid entries,
/// and the rejection reason otherwise. Never panics on malformed input.
pub fn parse_line(line: &str) -> std::result::Result<Option<LogEntry>, RejectReason> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(line).map_err(RejectReason::Json)?;
    let entry: LogEntry = serde_json::from_value(value).map_err(RejectReason::Schema)?;
    Ok(Some(entry))
}

/// Parse a whole session log file, line by line.
///
/// Entry order is stable (file line order). Rejected lines are counted and
/// logged; only file I/O failures surface as `Err`.
pub fn parse_file(path: &Path) -> Result<ParsedLog> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut parsed = ParsedLog::default();
    for (index, line_result) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line_result?;

        match parse_line(&line) {
            Ok(Some(entry)) => parsed.entries.push(entry),
            Ok(None) => {}
            Err(reason) => {
                parsed.rejected += 1;
                let warning = format!("Line {}: {}", line_number, reason);
                tracing::warn!(path = %path.display(), %warning, "Rejected log line");
                parsed.warnings.push(warning);
            }
        }
    }

    Ok(parsed)
}
