//! Path-derived identity for log and todo files
//!
//! Project and session identity never comes from file content; it is encoded
//! in where the file sits on disk:
//!
//! - Session logs: `<root>/projects/<encoded-project-path>/<session-id>.jsonl`
//! - Todo snapshots: `<root>/todos/<session-id>[-agent-<agent-id>].json`
//!
//! These are pure functions over path strings; no I/O happens here.

use crate::error::{Error, Result};
use std::path::{Component, Path};
use uuid::Uuid;

/// Project identity derived from a session log path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    /// Encoded path segment, e.g. "-home-dev-myproject"
    pub path: String,
    /// Display name, e.g. "home/dev/myproject"
    pub name: String,
}

fn invalid(path: &Path) -> Error {
    Error::InvalidPath {
        path: path.display().to_string(),
    }
}

/// Extract the project path segment and display name from a session log path.
///
/// The segment is the single directory between the `projects` directory and
/// the `.jsonl` file. The display name strips one leading dash and turns the
/// remaining dashes into path separators, e.g. `-foo-bar` becomes `foo/bar`.
pub fn project_info(file_path: &Path) -> Result<ProjectInfo> {
    let mut components = file_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .peekable();

    while let Some(part) = components.next() {
        if part != "projects" {
            continue;
        }
        let segment = components.next().ok_or_else(|| invalid(file_path))?;
        let file_name = components.next().ok_or_else(|| invalid(file_path))?;

        // The segment must be a directory holding the log file directly
        if components.peek().is_some() || !file_name.ends_with(".jsonl") {
            return Err(invalid(file_path));
        }

        let name = segment
            .strip_prefix('-')
            .unwrap_or(segment)
            .replace('-', "/");

        return Ok(ProjectInfo {
            path: segment.to_string(),
            name,
        });
    }

    Err(invalid(file_path))
}

/// Extract the session id from a session log path (the filename stem).
pub fn session_id(file_path: &Path) -> Result<String> {
    file_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.to_string())
        .ok_or_else(|| invalid(file_path))
}

/// Extract the session id from a todo snapshot filename.
///
/// Snapshot files are named `<session-uuid>.json` or
/// `<session-uuid>-agent-<agent-id>.json`. Returns `None` when the filename
/// does not carry a UUID-shaped session id.
pub fn todo_session_id(file_path: &Path) -> Option<String> {
    let stem = file_path.file_stem()?.to_str()?;
    let session = match stem.find("-agent-") {
        Some(index) => &stem[..index],
        None => stem,
    };

    Uuid::parse_str(session).ok()?;
    Some(session.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_project_info_round_trip() {
        let path = PathBuf::from(
            "/home/dev/.claude/projects/-foo-bar/b4749c81-937a-4bd4-b62c-9d78905f0975.jsonl",
        );
        let info = project_info(&path).unwrap();
        assert_eq!(info.path, "-foo-bar");
        assert_eq!(info.name, "foo/bar");
    }

    #[test]
    fn test_project_info_rejects_wrong_shape() {
        // No projects directory
        assert!(project_info(Path::new("/tmp/session.jsonl")).is_err());
        // File directly under projects
        assert!(project_info(Path::new("/root/.claude/projects/session.jsonl")).is_err());
        // Nested one level too deep
        assert!(project_info(Path::new(
            "/root/.claude/projects/-foo/extra/session.jsonl"
        ))
        .is_err());
        // Wrong extension
        assert!(project_info(Path::new("/root/.claude/projects/-foo/session.json")).is_err());
    }

    #[test]
    fn test_session_id_is_file_stem() {
        let path = PathBuf::from(
            "/root/.claude/projects/-foo/b4749c81-937a-4bd4-b62c-9d78905f0975.jsonl",
        );
        assert_eq!(
            session_id(&path).unwrap(),
            "b4749c81-937a-4bd4-b62c-9d78905f0975"
        );
    }

    #[test]
    fn test_todo_session_id_plain() {
        let path = PathBuf::from(
            "/root/.claude/todos/b4749c81-937a-4bd4-b62c-9d78905f0975.json",
        );
        assert_eq!(
            todo_session_id(&path).as_deref(),
            Some("b4749c81-937a-4bd4-b62c-9d78905f0975")
        );
    }

    #[test]
    fn test_todo_session_id_agent_suffix() {
        let path = PathBuf::from(
            "/root/.claude/todos/b4749c81-937a-4bd4-b62c-9d78905f0975-agent-a1b2c3d4.json",
        );
        assert_eq!(
            todo_session_id(&path).as_deref(),
            Some("b4749c81-937a-4bd4-b62c-9d78905f0975")
        );
    }

    #[test]
    fn test_todo_session_id_rejects_non_uuid() {
        let path = PathBuf::from("/root/.claude/todos/notes.json");
        assert!(todo_session_id(&path).is_none());
    }
}
