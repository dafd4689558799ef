//! Assistant process invocation
//!
//! Spawns the assistant, feeds the prompt on stdin and drains stdout/stderr
//! concurrently. The process is only waited on after every stream task has
//! reached end-of-stream: waiting earlier can deadlock on a full pipe.
//!
//! Lifecycle per invocation:
//! `Idle -> Started -> Draining -> Waited -> Succeeded | Failed`

use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio_util::sync::CancellationToken;

use crate::permissions::PermissionProfile;
use crate::surface::SurfaceHandle;
use crate::trace::DebugTail;

/// Lines carrying this prefix are diagnostics, not reply text
pub const DEBUG_PREFIX: &str = "[DEBUG] ";

/// How long drains may keep running after a timeout kill. Grandchildren that
/// inherited the pipes can hold them open past the child's death.
const KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamKind::Stdin => "stdin",
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        })
    }
}

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to acquire {0} pipe")]
    Pipe(StreamKind),
    #[error("Stream task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Why a started invocation did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitError {
    /// Non-zero exit; `None` when terminated by a signal
    Status(Option<i32>),
    Wait(String),
    TimedOut(Duration),
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitError::Status(Some(code)) => write!(f, "exit status {}", code),
            ExitError::Status(None) => write!(f, "terminated by signal"),
            ExitError::Wait(e) => write!(f, "wait failed: {}", e),
            ExitError::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs_f64()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Idle,
    Started,
    Draining,
    Waited,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub exit_error: Option<ExitError>,
    /// Non-diagnostic stdout lines joined with `\n`
    pub response_text: String,
    /// Non-diagnostic stderr lines joined with `\n`
    pub error_text: String,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        self.exit_error.is_none()
    }

    pub fn state(&self) -> InvocationState {
        if self.is_success() {
            InvocationState::Succeeded
        } else {
            InvocationState::Failed
        }
    }
}

/// How the invocation relates to earlier assistant sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFlag {
    /// `-r <uuid>`
    Resume(String),
    /// `-c`
    Continue,
    Fresh,
}

impl SessionFlag {
    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            SessionFlag::Resume(id) => {
                args.push("-r".to_string());
                args.push(id.clone());
            }
            SessionFlag::Continue => args.push("-c".to_string()),
            SessionFlag::Fresh => {}
        }
    }
}

/// Argument vector for a non-interactive, debug-enabled run. The prompt is
/// never an argument; it goes to stdin.
pub fn build_args<S: AsRef<str>>(profile: &PermissionProfile, known_tools: &[S], session: &SessionFlag) -> Vec<String> {
    let mut args = vec!["-p".to_string(), "--debug".to_string()];
    session.push_args(&mut args);

    let allowed = profile.effective_allowed();
    if !allowed.is_empty() {
        args.push("--allowedTools".to_string());
        args.push(allowed.join(","));
    }

    let disallowed = profile.compute_disallowed(known_tools);
    if !disallowed.is_empty() {
        args.push("--disallowedTools".to_string());
        args.push(disallowed.join(","));
    }

    args.push("--permission-mode".to_string());
    args.push(profile.mode().to_string());
    args
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl AssistantCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Diagnostic,
    Response,
}

pub fn classify_line(line: &str) -> LineClass {
    if line.starts_with(DEBUG_PREFIX) {
        LineClass::Diagnostic
    } else {
        LineClass::Response
    }
}

/// Where drained lines go
#[derive(Debug, Clone)]
pub struct StreamSinks {
    /// Receives reply text as it streams in
    pub primary: SurfaceHandle,
    /// Receives diagnostic lines from both streams
    pub trace: Option<SurfaceHandle>,
}

async fn feed_stdin(mut stdin: ChildStdin, prompt: String) -> std::io::Result<()> {
    stdin.write_all(prompt.as_bytes()).await?;
    stdin.shutdown().await
}

/// Lines collected by a drain, readable even if the drain is aborted
type Collected = Arc<Mutex<Vec<String>>>;

/// Read `reader` to end-of-stream, routing each line in order and collecting
/// the non-diagnostic lines into `kept`.
async fn drain<R>(reader: R, kind: StreamKind, sinks: StreamSinks, kept: Collected)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(stream = %kind, error = %e, "Stream read failed, discarding remainder");
                // Keep the pipe flowing so the child never blocks on a full buffer
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                break;
            }
        }

        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches('\n').trim_end_matches('\r');

        match classify_line(line) {
            LineClass::Diagnostic => {
                if let Some(trace) = &sinks.trace {
                    trace.append_lossy(&format!("{}\n", line));
                }
            }
            LineClass::Response => {
                if kind == StreamKind::Stdout {
                    sinks.primary.append_lossy(&format!("{}\n", line));
                }
                kept.lock().push(line.to_string());
            }
        }
    }
}

/// Runs one assistant process per call.
#[derive(Debug, Clone)]
pub struct AssistantInvoker {
    timeout: Option<Duration>,
    kill_grace: Duration,
    debug_tail: Option<DebugTail>,
}

impl Default for AssistantInvoker {
    fn default() -> Self {
        Self {
            timeout: None,
            kill_grace: KILL_GRACE,
            debug_tail: None,
        }
    }
}

impl AssistantInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the process if the streams have not closed within `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// After a timeout kill, abandon drains still open after `grace`.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Tail the assistant's debug logs into the trace sink while running.
    pub fn with_debug_tail(mut self, tail: DebugTail) -> Self {
        self.debug_tail = Some(tail);
        self
    }

    pub async fn invoke(
        &self,
        command: &AssistantCommand,
        prompt: String,
        sinks: &StreamSinks,
    ) -> Result<InvocationResult, InvokeError> {
        let mut state = InvocationState::Idle;
        let mut advance = |next: InvocationState| {
            tracing::debug!(program = %command.program, from = ?state, to = ?next, "Invocation state");
            state = next;
        };

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| {
            tracing::error!(program = %command.program, error = %source, "Failed to spawn assistant");
            InvokeError::Spawn {
                program: command.program.clone(),
                source,
            }
        })?;
        let stdin = child.stdin.take().ok_or(InvokeError::Pipe(StreamKind::Stdin))?;
        let stdout = child.stdout.take().ok_or(InvokeError::Pipe(StreamKind::Stdout))?;
        let stderr = child.stderr.take().ok_or(InvokeError::Pipe(StreamKind::Stderr))?;
        advance(InvocationState::Started);

        let cancel = CancellationToken::new();
        let tail = match (&self.debug_tail, &sinks.trace) {
            (Some(tail), Some(trace)) => Some(tail.clone().spawn(trace.clone(), cancel.clone())),
            _ => None,
        };

        let out_lines = Collected::default();
        let err_lines = Collected::default();
        let writer = tokio::spawn(feed_stdin(stdin, prompt));
        let out_task = tokio::spawn(drain(stdout, StreamKind::Stdout, sinks.clone(), out_lines.clone()));
        let err_task = tokio::spawn(drain(stderr, StreamKind::Stderr, sinks.clone(), err_lines.clone()));
        advance(InvocationState::Draining);

        let aborts = [writer.abort_handle(), out_task.abort_handle(), err_task.abort_handle()];
        let drains = async { tokio::join!(writer, out_task, err_task) };
        tokio::pin!(drains);

        let mut timed_out = None;
        let (written, out_done, err_done) = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut drains).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(program = %command.program, limit_secs = limit.as_secs_f64(), "Invocation timed out, killing");
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(error = %e, "Failed to kill assistant");
                    }
                    timed_out = Some(limit);

                    match tokio::time::timeout(self.kill_grace, &mut drains).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            tracing::warn!(program = %command.program, "Streams still open after kill, abandoning drains");
                            for handle in &aborts {
                                handle.abort();
                            }
                            drains.await
                        }
                    }
                }
            },
            None => drains.await,
        };

        // Drains are finished or abandoned; the trace tail can wind down.
        cancel.cancel();

        match written {
            Ok(Err(e)) => tracing::warn!(error = %e, "Prompt delivery to stdin incomplete"),
            Ok(Ok(())) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => return Err(e.into()),
        }
        for done in [out_done, err_done] {
            match done {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => return Err(e.into()),
            }
        }
        let out_lines = std::mem::take(&mut *out_lines.lock());
        let err_lines = std::mem::take(&mut *err_lines.lock());

        let wait = child.wait().await;
        advance(InvocationState::Waited);

        if let Some(tail) = tail {
            match tail.await {
                Ok(lines) => tracing::debug!(lines, "Debug tail finished"),
                Err(e) => tracing::warn!(error = %e, "Debug tail task failed"),
            }
        }

        let exit_error = match (timed_out, wait) {
            (Some(limit), _) => Some(ExitError::TimedOut(limit)),
            (None, Ok(status)) if status.success() => None,
            (None, Ok(status)) => Some(ExitError::Status(status.code())),
            (None, Err(e)) => Some(ExitError::Wait(e.to_string())),
        };

        let result = InvocationResult {
            exit_error,
            response_text: out_lines.join("\n"),
            error_text: err_lines.join("\n"),
        };
        advance(result.state());

        Ok(result)
    }
}
