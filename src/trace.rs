//! Debug-log tailing
//!
//! While an invocation runs, the assistant appends diagnostics to text files
//! in its debug directory. `DebugTail` polls that directory, forwards newly
//! appended tool-usage lines to the trace surface, and stops when cancelled
//! or when the logs go quiet.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::surface::SurfaceHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Idle polls before giving up (3 seconds at the default interval)
const IDLE_POLL_LIMIT: u32 = 60;

const IMPORTANT_PATTERNS: &[&str] = &[
    "for tool: Read",
    "for tool: Write",
    "for tool: Edit",
    "for tool: Glob",
    "for tool: Grep",
    "for tool: Bash",
    "for tool: WebSearch",
    "for tool: WebFetch",
    "for tool: Task",
    "for tool: NotebookEdit",
    "for tool: MultiEdit",
    "tool_use",
];

pub fn is_important(line: &str) -> bool {
    IMPORTANT_PATTERNS.iter().any(|p| line.contains(p))
}

fn list_logs(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn file_len(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

/// Read complete lines appended after `offset`. Returns the lines and the new
/// offset, which stops at the last newline so a half-written line is picked
/// up whole on a later poll.
fn read_appended(path: &Path, offset: u64) -> std::io::Result<(Vec<String>, u64)> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let Some(last_newline) = bytes.iter().rposition(|b| *b == b'\n') else {
        return Ok((Vec::new(), offset));
    };
    let complete = &bytes[..=last_newline];
    let lines = String::from_utf8_lossy(complete)
        .lines()
        .map(str::to_string)
        .collect();
    Ok((lines, offset + complete.len() as u64))
}

type Offsets = HashMap<PathBuf, u64>;

fn baseline(dir: &Path) -> Offsets {
    list_logs(dir)
        .into_iter()
        .filter_map(|p| file_len(&p).map(|len| (p, len)))
        .collect()
}

/// One pass over the debug directory. Returns the important lines appended
/// since the last pass and whether any log advanced. A log shorter than its
/// recorded offset was truncated or replaced and is read from the start.
fn poll_logs(dir: &Path, offsets: &mut Offsets) -> (Vec<String>, bool) {
    let mut important = Vec::new();
    let mut changed = false;

    for path in list_logs(dir) {
        let Some(len) = file_len(&path) else { continue };
        let mut offset = offsets.get(&path).copied().unwrap_or(0);
        if len < offset {
            tracing::debug!(path = %path.display(), len, offset, "Debug log shrank, rereading");
            offset = 0;
            offsets.insert(path.clone(), 0);
        }
        if len == offset {
            continue;
        }

        match read_appended(&path, offset) {
            Ok((lines, new_offset)) => {
                if new_offset > offset {
                    changed = true;
                }
                important.extend(lines.into_iter().filter(|l| is_important(l)));
                offsets.insert(path, new_offset);
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Debug log read failed");
            }
        }
    }

    (important, changed)
}

#[derive(Debug, Clone)]
pub struct DebugTail {
    dir: PathBuf,
    poll_interval: Duration,
    idle_limit: u32,
}

impl DebugTail {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            poll_interval: POLL_INTERVAL,
            idle_limit: IDLE_POLL_LIMIT,
        }
    }

    pub fn with_timing(mut self, poll_interval: Duration, idle_limit: u32) -> Self {
        self.poll_interval = poll_interval;
        self.idle_limit = idle_limit;
        self
    }

    /// Start tailing. The task resolves to the number of lines forwarded.
    pub fn spawn(self, sink: SurfaceHandle, cancel: CancellationToken) -> JoinHandle<usize> {
        tokio::spawn(async move { self.run(sink, cancel).await })
    }

    async fn run(self, sink: SurfaceHandle, cancel: CancellationToken) -> usize {
        let dir = self.dir.clone();
        let mut offsets = match tokio::task::spawn_blocking(move || baseline(&dir)).await {
            Ok(offsets) => offsets,
            Err(e) => {
                tracing::warn!(error = %e, "Debug log baseline failed");
                Offsets::new()
            }
        };

        sink.append_lossy(&format!(
            "[TRACE] Monitoring debug directory with {} existing files\n",
            offsets.len()
        ));

        let mut ticker = tokio::time::interval(self.poll_interval);
        let mut idle_polls = 0u32;
        let mut total = 0usize;

        loop {
            // Cancellation is only observed between polls; a poll always
            // finishes forwarding what it read.
            tokio::select! {
                _ = cancel.cancelled() => {
                    sink.append_lossy(&format!("[TRACE] Debug monitoring stopped, read {} total lines\n", total));
                    return total;
                }
                _ = ticker.tick() => {}
            }

            // Directory scans and reads stay off the runtime threads.
            let dir = self.dir.clone();
            let polled = tokio::task::spawn_blocking(move || {
                let found = poll_logs(&dir, &mut offsets);
                (offsets, found)
            })
            .await;
            let (lines, changed) = match polled {
                Ok((returned, found)) => {
                    offsets = returned;
                    found
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Debug log poll failed");
                    sink.append_lossy(&format!("[TRACE] Debug monitoring stopped, read {} total lines\n", total));
                    return total;
                }
            };

            for line in &lines {
                sink.append_lossy(&format!("{}\n", line));
            }
            total += lines.len();

            if changed {
                idle_polls = 0;
            } else {
                idle_polls += 1;
                if idle_polls > self.idle_limit {
                    sink.append_lossy(&format!(
                        "[TRACE] No new debug output, read {} total lines\n",
                        total
                    ));
                    return total;
                }
            }
        }
    }
}
