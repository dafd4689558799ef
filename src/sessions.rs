//! Assistant session discovery.
//!
//! The assistant writes one JSONL transcript per session under
//! `<projects>/<encoded working dir>/<session id>.jsonl`. Transcripts are only
//! read here, never written.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),
}

/// Summary when a transcript has neither a summary record nor a user message
pub const DEFAULT_SUMMARY: &str = "conversation";
/// Summary when a transcript line could not be scanned
pub const PARSE_ERROR_SUMMARY: &str = "conversation (parse error)";

/// Longest transcript line scanned for a summary
const MAX_LINE_BYTES: usize = 1024 * 1024;
const SUMMARY_PREVIEW_CHARS: usize = 50;

const SUMMARY_FIELD: &str = r#""summary":""#;
const CONTENT_FIELD: &str = r#""content":""#;
const USER_ROLE: &str = r#""role":"user""#;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub transcript_path: PathBuf,
    pub summary: String,
    pub modified: DateTime<Utc>,
}

/// Canonical 8-4-4-4-12 hexadecimal UUID, nothing else.
pub fn is_uuid(s: &str) -> bool {
    s.len() == 36
        && s.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

pub fn validate_session_id(session_id: &str) -> Result<(), SessionError> {
    if is_uuid(session_id) {
        Ok(())
    } else {
        Err(SessionError::InvalidSessionId(session_id.to_string()))
    }
}

/// Strip whitespace plus the quote and bracket characters a listing line
/// wraps around an id.
pub fn strip_session_delimiters(text: &str) -> &str {
    text.trim().trim_matches(|c| matches!(c, '"' | '\'' | '[' | ']'))
}

/// Value of a `"field":"…"` pair, read up to the next quote.
fn scan_field<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let start = line.find(field)? + field.len();
    let len = line[start..].find('"')?;
    Some(&line[start..start + len])
}

fn preview(content: &str) -> String {
    if content.chars().count() > SUMMARY_PREVIEW_CHARS {
        let head: String = content.chars().take(SUMMARY_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

/// Scan a transcript for a human-readable summary without parsing it.
///
/// Prefers an explicit summary record, then the first user message. A line
/// that cannot be read degrades to a placeholder instead of failing.
pub fn extract_summary(transcript: &Path) -> String {
    let file = match File::open(transcript) {
        Ok(f) => f,
        Err(_) => return DEFAULT_SUMMARY.to_string(),
    };

    let mut reader = BufReader::new(file);
    let mut first_user: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.by_ref().take(MAX_LINE_BYTES as u64 + 1).read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(path = %transcript.display(), error = %e, "Transcript read failed");
                return PARSE_ERROR_SUMMARY.to_string();
            }
        }
        if buf.len() > MAX_LINE_BYTES {
            tracing::debug!(path = %transcript.display(), "Transcript line too long to scan");
            return PARSE_ERROR_SUMMARY.to_string();
        }

        let line = String::from_utf8_lossy(&buf);
        if let Some(summary) = scan_field(&line, SUMMARY_FIELD).filter(|s| !s.is_empty()) {
            return summary.to_string();
        }
        if first_user.is_none() && line.contains(USER_ROLE) {
            if let Some(content) = scan_field(&line, CONTENT_FIELD).filter(|s| !s.is_empty()) {
                first_user = Some(preview(content));
            }
        }
    }

    first_user.unwrap_or_else(|| DEFAULT_SUMMARY.to_string())
}

/// Finds transcripts for a working directory.
#[derive(Debug, Clone)]
pub struct SessionLocator {
    projects_dir: PathBuf,
}

impl SessionLocator {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
        }
    }

    /// Transcript directory for a working directory: separators become `-`.
    pub fn project_dir_for(&self, working_dir: &Path) -> PathBuf {
        let encoded = working_dir.to_string_lossy().replace('/', "-");
        self.projects_dir.join(encoded)
    }

    /// Sessions in `project_dir`, most recently modified first.
    pub fn list_sessions(&self, project_dir: &Path) -> Result<Vec<Session>, SessionError> {
        let entries = match fs::read_dir(project_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SessionError::Io(e)),
        };

        let mut found: Vec<(SystemTime, String, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            // Sidechain transcripts (`agent-*.jsonl`) cannot be resumed.
            if !is_uuid(&id) {
                tracing::debug!(path = %path.display(), "Skipping non-session transcript");
                continue;
            }
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable transcript");
                    continue;
                }
            };
            found.push((modified, id, path));
        }

        // Most recent first
        found.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(found
            .into_iter()
            .map(|(modified, id, path)| Session {
                summary: extract_summary(&path),
                id,
                transcript_path: path,
                modified: DateTime::<Utc>::from(modified),
            })
            .collect())
    }

    pub fn most_recent(&self, project_dir: &Path) -> Result<Option<String>, SessionError> {
        Ok(self.list_sessions(project_dir)?.into_iter().next().map(|s| s.id))
    }
}

/// One `[id] | summary` line per session
pub fn render_listing(working_dir: &Path, sessions: &[Session]) -> String {
    let mut out = format!(
        "# Sessions for {} - select an id and Load\n\n",
        working_dir.display()
    );
    if sessions.is_empty() {
        out.push_str("No sessions found\n");
    }
    for session in sessions {
        out.push_str(&format!("[{}] | {}\n", session.id, session.summary));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const ID: &str = "123e4567-e89b-12d3-a456-426614174000";

    fn write_transcript(dir: &Path, id: &str, body: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(format!("{}.jsonl", id));
        fs::write(&path, body).unwrap();
        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs)).unwrap();
        path
    }

    #[test]
    fn test_uuid_validation() {
        assert!(is_uuid(ID));
        assert!(is_uuid(&ID.to_uppercase()));
        assert!(!is_uuid("123e4567e89b-12d3-a456-426614174000"));
        assert!(!is_uuid("123e4567-e89b-12d3-a456-42661417400g"));
        assert!(!is_uuid(&format!("[{}]", ID)));
        assert!(validate_session_id("../etc").is_err());
    }

    #[test]
    fn test_strip_session_delimiters() {
        assert_eq!(strip_session_delimiters(&format!("  [{}] ", ID)), ID);
        assert_eq!(strip_session_delimiters(&format!("\"{}\"", ID)), ID);
    }

    #[test]
    fn test_project_dir_encoding() {
        let locator = SessionLocator::new("/home/u/.claude/projects");
        assert_eq!(
            locator.project_dir_for(Path::new("/home/u/src/app")),
            PathBuf::from("/home/u/.claude/projects/-home-u-src-app")
        );
    }

    #[test]
    fn test_summary_field_preferred() {
        let tmp = TempDir::new().unwrap();
        let body = concat!(
            r#"{"type":"user","message":{"role":"user","content":"fix the build"}}"#, "\n",
            r#"{"type":"summary","summary":"Build repair"}"#, "\n",
        );
        let path = write_transcript(tmp.path(), ID, body, 0);
        assert_eq!(extract_summary(&path), "Build repair");
    }

    #[test]
    fn test_summary_falls_back_to_first_user_message() {
        let tmp = TempDir::new().unwrap();
        let long = "x".repeat(80);
        let body = format!(
            "{{\"message\":{{\"role\":\"user\",\"content\":\"{}\"}}}}\n{{\"message\":{{\"role\":\"user\",\"content\":\"second\"}}}}\n",
            long
        );
        let path = write_transcript(tmp.path(), ID, &body, 0);
        assert_eq!(extract_summary(&path), format!("{}...", "x".repeat(50)));
    }

    #[test]
    fn test_summary_placeholders() {
        let tmp = TempDir::new().unwrap();
        let empty = write_transcript(tmp.path(), "a", "{\"type\":\"system\"}\n", 0);
        assert_eq!(extract_summary(&empty), DEFAULT_SUMMARY);

        let huge = format!("{{\"blob\":\"{}\"}}\n", "y".repeat(MAX_LINE_BYTES + 10));
        let oversized = write_transcript(tmp.path(), "b", &huge, 0);
        assert_eq!(extract_summary(&oversized), PARSE_ERROR_SUMMARY);
    }

    #[test]
    fn test_list_sessions_sorted_by_mtime() {
        let tmp = TempDir::new().unwrap();
        let oldest = "00000000-0000-0000-0000-000000000001";
        let newest = "00000000-0000-0000-0000-000000000002";
        let middle = "00000000-0000-0000-0000-000000000003";
        write_transcript(tmp.path(), oldest, "", 300);
        write_transcript(tmp.path(), newest, "", 10);
        write_transcript(tmp.path(), middle, "", 100);
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let locator = SessionLocator::new(tmp.path());
        let sessions = locator.list_sessions(tmp.path()).unwrap();
        let ids: Vec<_> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, [newest, middle, oldest]);
        assert!(sessions[0].modified > sessions[1].modified);
        assert!(sessions[1].modified > sessions[2].modified);
        assert_eq!(locator.most_recent(tmp.path()).unwrap().as_deref(), Some(newest));
    }

    #[test]
    fn test_non_uuid_transcripts_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write_transcript(tmp.path(), ID, "", 100);
        write_transcript(tmp.path(), "agent-1", "", 0);
        write_transcript(tmp.path(), "summary", "", 0);

        let locator = SessionLocator::new(tmp.path());
        let sessions = locator.list_sessions(tmp.path()).unwrap();
        let ids: Vec<_> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, [ID]);
        assert_eq!(locator.most_recent(tmp.path()).unwrap().as_deref(), Some(ID));
    }

    #[test]
    fn test_missing_project_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let locator = SessionLocator::new(tmp.path());
        let missing = tmp.path().join("nope");
        assert!(locator.list_sessions(&missing).unwrap().is_empty());
        assert_eq!(locator.most_recent(&missing).unwrap(), None);
    }

    #[test]
    fn test_render_listing() {
        let session = Session {
            id: ID.to_string(),
            transcript_path: PathBuf::from("/t.jsonl"),
            summary: "Build repair".into(),
            modified: Utc::now(),
        };
        let text = render_listing(Path::new("/work"), &[session]);
        assert!(text.ends_with(&format!("[{}] | Build repair\n", ID)));
    }
}
