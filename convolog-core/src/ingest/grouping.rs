//! Tool-burst turn grouping
//!
//! The source UI splits one uninterrupted tool-use turn into several
//! assistant entries, one per network round trip, interleaved with user
//! entries that merely echo each tool's result. Presenting those as separate
//! messages misrepresents the conversation, so before persisting, runs of
//! tool-bearing assistant entries are collapsed into a single entry:
//!
//! - A group opens at an assistant entry containing at least one tool_use
//!   block and extends across subsequent tool-bearing assistant entries.
//! - User entries classified as pure tool-result echoes are stepped over;
//!   they contribute nothing and are never persisted.
//! - A genuine user entry, a summary, or a text-bearing assistant entry
//!   closes the group. Plain text from the assistant signals it has returned
//!   to conversing rather than acting.
//! - A thinking-only assistant entry is absorbed into the group only when a
//!   further tool-bearing assistant entry follows it; a trailing one closes
//!   the group and passes through on its own.
//!
//! The merged entry keeps every attribute of the group's first entry and
//! concatenates all content blocks in their original order.

use crate::ingest::entry::{AssistantEntry, LogEntry, UserContent, UserEntry};

/// Collapse bursts of tool-bearing assistant entries into single entries.
///
/// Non-assistant entries and tool-free assistant entries pass through
/// unchanged, in order. The output is the sequence of turns to persist.
pub fn group_tool_turns(entries: Vec<LogEntry>) -> Vec<LogEntry> {
    let mut grouped = Vec::with_capacity(entries.len());
    let mut i = 0;

    while i < entries.len() {
        let opens_group = matches!(&entries[i], LogEntry::Assistant(a) if a.has_tool_use());
        if !opens_group {
            grouped.push(entries[i].clone());
            i += 1;
            continue;
        }

        let mut group: Vec<AssistantEntry> = Vec::new();
        if let LogEntry::Assistant(first) = &entries[i] {
            group.push(first.clone());
        }

        // Thinking-only entries seen since the last tool-bearing entry.
        // They join the group only if another tool-bearing entry follows;
        // otherwise they are rescanned as ordinary entries.
        let mut pending_thinking: Vec<AssistantEntry> = Vec::new();
        let mut j = i + 1;
        // First index not consumed by the group.
        let mut consumed_to = j;

        while j < entries.len() {
            match &entries[j] {
                LogEntry::User(user) if is_tool_result_echo(user) => {
                    j += 1;
                    if pending_thinking.is_empty() {
                        consumed_to = j;
                    }
                }
                LogEntry::Assistant(next) if next.has_tool_use() => {
                    group.append(&mut pending_thinking);
                    group.push(next.clone());
                    j += 1;
                    consumed_to = j;
                }
                LogEntry::Assistant(next) if next.is_thinking_only() => {
                    pending_thinking.push(next.clone());
                    j += 1;
                }
                _ => break,
            }
        }

        if group.len() > 1 {
            tracing::debug!(
                merged = group.len(),
                "Merged consecutive tool-bearing assistant entries"
            );
        }
        grouped.push(LogEntry::Assistant(merge_group(group)));
        i = consumed_to;
    }

    grouped
}

/// Merge a group of assistant entries into one.
///
/// Attributes come from the first entry; content blocks are concatenated in
/// group order. Callers guarantee the group is non-empty.
fn merge_group(mut group: Vec<AssistantEntry>) -> AssistantEntry {
    let mut merged = group.remove(0);
    for entry in group {
        merged.message.content.extend(entry.message.content);
    }
    merged
}

/// Whether a user entry is a pure tool-result echo.
///
/// Echo entries carry no genuine user input: either every content block is a
/// tool-result reference with no accompanying text, or the content is a
/// string of JSON that is itself a tool-result reference (or an array of
/// them). This is a structural heuristic, not a guarantee; the upstream
/// format has no explicit tag for these.
pub fn is_tool_result_echo(entry: &UserEntry) -> bool {
    match &entry.message.content {
        UserContent::Blocks(blocks) => blocks
            .iter()
            .all(|block| block.tool_use_id.is_some() && block.text.is_none()),
        UserContent::Text(text) => {
            let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) else {
                return false;
            };
            match value {
                serde_json::Value::Array(items) => items.iter().all(is_result_reference),
                other => is_result_reference(&other),
            }
        }
    }
}

/// Whether a JSON value looks like a single tool-result reference.
fn is_result_reference(value: &serde_json::Value) -> bool {
    value
        .get("tool_use_id")
        .and_then(serde_json::Value::as_str)
        .map_or(false, |id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::entry::{AssistantBlock, AssistantPayload, UserBlock, UserPayload};

    fn assistant(uuid: &str, blocks: Vec<AssistantBlock>) -> LogEntry {
        LogEntry::Assistant(AssistantEntry {
            uuid: uuid.to_string(),
            parent_uuid: None,
            session_id: "s-1".to_string(),
            timestamp: "2024-03-01T10:00:00Z".to_string(),
            is_sidechain: false,
            message: AssistantPayload {
                role: Some("assistant".to_string()),
                model: Some("some-model".to_string()),
                content: blocks,
            },
        })
    }

    fn user_text(uuid: &str, text: &str) -> LogEntry {
        LogEntry::User(UserEntry {
            uuid: uuid.to_string(),
            parent_uuid: None,
            session_id: "s-1".to_string(),
            timestamp: "2024-03-01T10:00:00Z".to_string(),
            is_sidechain: false,
            message: UserPayload {
                role: Some("user".to_string()),
                content: UserContent::Text(text.to_string()),
            },
            is_meta: false,
        })
    }

    fn echo(uuid: &str, tool_use_id: &str) -> LogEntry {
        LogEntry::User(UserEntry {
            uuid: uuid.to_string(),
            parent_uuid: None,
            session_id: "s-1".to_string(),
            timestamp: "2024-03-01T10:00:00Z".to_string(),
            is_sidechain: false,
            message: UserPayload {
                role: Some("user".to_string()),
                content: UserContent::Blocks(vec![UserBlock {
                    block_type: "tool_result".to_string(),
                    text: None,
                    tool_use_id: Some(tool_use_id.to_string()),
                    content: Some(serde_json::json!("ok")),
                    tool_result: None,
                }]),
            },
            is_meta: false,
        })
    }

    fn tool(id: &str, name: &str, command: &str) -> AssistantBlock {
        AssistantBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input: serde_json::json!({ "command": command }),
        }
    }

    fn text(body: &str) -> AssistantBlock {
        AssistantBlock::Text {
            text: body.to_string(),
        }
    }

    fn thinking(body: &str) -> AssistantBlock {
        AssistantBlock::Thinking {
            thinking: body.to_string(),
        }
    }

    fn tool_ids(entry: &LogEntry) -> Vec<String> {
        let LogEntry::Assistant(a) = entry else {
            panic!("expected assistant entry");
        };
        a.message
            .content
            .iter()
            .filter_map(|block| match block {
                AssistantBlock::ToolUse { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_consecutive_tool_entries_merge() {
        let entries = vec![
            assistant("a-1", vec![tool("t-1", "Bash", "ls -la")]),
            echo("u-1", "t-1"),
            assistant("a-2", vec![tool("t-2", "Bash", "pwd")]),
            echo("u-2", "t-2"),
            assistant("a-3", vec![tool("t-3", "Bash", "echo 'hello'")]),
            user_text("u-3", "thank you"),
        ];

        let grouped = group_tool_turns(entries);

        assert_eq!(grouped.len(), 2);
        assert_eq!(tool_ids(&grouped[0]), vec!["t-1", "t-2", "t-3"]);
        let LogEntry::Assistant(merged) = &grouped[0] else {
            panic!("expected assistant entry");
        };
        assert_eq!(merged.uuid, "a-1");
        let LogEntry::User(user) = &grouped[1] else {
            panic!("expected user entry");
        };
        assert_eq!(user.uuid, "u-3");
    }

    #[test]
    fn test_text_entry_breaks_group() {
        let entries = vec![
            assistant("a-1", vec![tool("t-1", "Bash", "ls")]),
            assistant("a-2", vec![text("Here is what I found")]),
            assistant("a-3", vec![tool("t-2", "Read", "x")]),
            assistant("a-4", vec![tool("t-3", "Read", "y")]),
        ];

        let grouped = group_tool_turns(entries);

        assert_eq!(grouped.len(), 3);
        assert_eq!(tool_ids(&grouped[0]), vec!["t-1"]);
        assert!(tool_ids(&grouped[2]) == vec!["t-2", "t-3"]);
        let LogEntry::Assistant(middle) = &grouped[1] else {
            panic!("expected assistant entry");
        };
        assert_eq!(middle.uuid, "a-2");
    }

    #[test]
    fn test_mixed_text_and_tool_entry_opens_group() {
        // text + tool_use in one entry still counts as tool-bearing
        let entries = vec![
            assistant("a-1", vec![text("Let me check"), tool("t-1", "Bash", "ls")]),
            assistant("a-2", vec![tool("t-2", "Bash", "pwd")]),
        ];

        let grouped = group_tool_turns(entries);

        assert_eq!(grouped.len(), 1);
        assert_eq!(tool_ids(&grouped[0]), vec!["t-1", "t-2"]);
    }

    #[test]
    fn test_sandwiched_thinking_entry_absorbed() {
        let entries = vec![
            assistant("a-1", vec![tool("t-1", "Bash", "ls")]),
            assistant("a-2", vec![thinking("which dir next")]),
            assistant("a-3", vec![tool("t-2", "Bash", "pwd")]),
        ];

        let grouped = group_tool_turns(entries);

        assert_eq!(grouped.len(), 1);
        assert_eq!(tool_ids(&grouped[0]), vec!["t-1", "t-2"]);
        let LogEntry::Assistant(merged) = &grouped[0] else {
            panic!("expected assistant entry");
        };
        // All blocks survive the merge in chronological order
        assert_eq!(merged.message.content.len(), 3);
        assert!(matches!(
            merged.message.content[1],
            AssistantBlock::Thinking { .. }
        ));
    }

    #[test]
    fn test_trailing_thinking_entry_breaks_group() {
        let entries = vec![
            assistant("a-1", vec![tool("t-1", "Bash", "ls")]),
            assistant("a-2", vec![tool("t-2", "Bash", "pwd")]),
            assistant("a-3", vec![thinking("all done")]),
            user_text("u-1", "great"),
        ];

        let grouped = group_tool_turns(entries);

        assert_eq!(grouped.len(), 3);
        assert_eq!(tool_ids(&grouped[0]), vec!["t-1", "t-2"]);
        let LogEntry::Assistant(thinking_entry) = &grouped[1] else {
            panic!("expected assistant entry");
        };
        assert_eq!(thinking_entry.uuid, "a-3");
    }

    #[test]
    fn test_echo_after_unabsorbed_thinking_passes_through() {
        let entries = vec![
            assistant("a-1", vec![tool("t-1", "Bash", "ls")]),
            assistant("a-2", vec![thinking("waiting")]),
            echo("u-1", "t-1"),
            user_text("u-2", "stop"),
        ];

        let grouped = group_tool_turns(entries);

        // The group closed before the thinking entry; everything after it is
        // rescanned and passed through. The echo is filtered later, at
        // persistence time.
        assert_eq!(grouped.len(), 4);
        assert_eq!(tool_ids(&grouped[0]), vec!["t-1"]);
    }

    #[test]
    fn test_summary_breaks_group() {
        let entries = vec![
            assistant("a-1", vec![tool("t-1", "Bash", "ls")]),
            serde_json::from_value(serde_json::json!({
                "type": "summary",
                "summary": "Explored the directory",
                "leafUuid": "a-1",
            }))
            .unwrap(),
            assistant("a-2", vec![tool("t-2", "Bash", "pwd")]),
        ];

        let grouped = group_tool_turns(entries);

        assert_eq!(grouped.len(), 3);
        assert_eq!(tool_ids(&grouped[0]), vec!["t-1"]);
        assert_eq!(tool_ids(&grouped[2]), vec!["t-2"]);
    }

    #[test]
    fn test_lone_echo_passes_through() {
        // An echo with no preceding tool entry is not consumed by any group;
        // the persistence filter is what keeps it out of storage.
        let grouped = group_tool_turns(vec![echo("u-1", "t-9")]);
        assert_eq!(grouped.len(), 1);
    }

    #[test]
    fn test_echo_classifier_blocks() {
        let LogEntry::User(pure) = echo("u-1", "t-1") else {
            unreachable!()
        };
        assert!(is_tool_result_echo(&pure));

        // A block with accompanying text is genuine input
        let LogEntry::User(mut with_text) = echo("u-2", "t-1") else {
            unreachable!()
        };
        if let UserContent::Blocks(blocks) = &mut with_text.message.content {
            blocks[0].text = Some("and also...".to_string());
        }
        assert!(!is_tool_result_echo(&with_text));
    }

    #[test]
    fn test_echo_classifier_json_string() {
        let LogEntry::User(object) = user_text("u-1", r#"{"tool_use_id":"t-1"}"#) else {
            unreachable!()
        };
        assert!(is_tool_result_echo(&object));

        let LogEntry::User(array) =
            user_text("u-2", r#"[{"tool_use_id":"t-1"},{"tool_use_id":"t-2"}]"#)
        else {
            unreachable!()
        };
        assert!(is_tool_result_echo(&array));
    }

    #[test]
    fn test_echo_classifier_adversarial_inputs() {
        // Prose that merely mentions the field name
        let LogEntry::User(prose) = user_text("u-1", "what does tool_use_id mean?") else {
            unreachable!()
        };
        assert!(!is_tool_result_echo(&prose));

        // Valid JSON whose tool_use_id is nested, not top-level
        let LogEntry::User(nested) =
            user_text("u-2", r#"{"note":{"tool_use_id":"t-1"}}"#)
        else {
            unreachable!()
        };
        assert!(!is_tool_result_echo(&nested));

        // An array with one genuine element is not an echo
        let LogEntry::User(mixed) =
            user_text("u-3", r#"[{"tool_use_id":"t-1"},{"text":"hi"}]"#)
        else {
            unreachable!()
        };
        assert!(!is_tool_result_echo(&mixed));
    }
}
