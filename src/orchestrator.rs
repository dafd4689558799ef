//! Command handlers for one working directory
//!
//! `Orchestrator` ties the stores, the session locator and the invoker to the
//! editor's surfaces. The active session lives on `InvocationScope`, so
//! nothing here is process-global.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::commands::{Command, SurfaceKind, HANDLERS};
use crate::config::{Config, ConfigError};
use crate::context::{BudgetStatus, ContextManager, HistoryBudget, ASSISTANT_LABEL, HISTORY_SEPARATOR, USER_LABEL};
use crate::invoker::{build_args, AssistantCommand, AssistantInvoker, ExitError, InvokeError, SessionFlag, StreamSinks};
use crate::permissions::{render_current, render_edit_listing, EditBatch, PermissionStore, UnknownMode};
use crate::sessions::{render_listing, strip_session_delimiters, validate_session_id, SessionError, SessionLocator};
use crate::store::{DirectoryKey, KeyedStore, StoreError};
use crate::surface::{SurfaceError, SurfaceHandle};
use crate::trace::DebugTail;

pub const EMPTY_PROMPT_NOTICE: &str = "Prompt is empty. Enter your request first.\n";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Invoke(#[from] InvokeError),
    #[error("{0}")]
    Surface(#[from] SurfaceError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Mode(#[from] UnknownMode),
    #[error("Assistant failed ({status}): {detail}")]
    AssistantFailed { status: ExitError, detail: String },
}

/// What a dispatched command came to
#[derive(Debug)]
pub enum Dispatch {
    Handled,
    /// Not ours; the caller decides what to do with it
    PassThrough(Command),
    /// Already reported on the command's surface
    Failed(AppError),
}

/// Per-directory state that outlives a single command
#[derive(Debug, Clone)]
pub struct InvocationScope {
    pub working_dir: PathBuf,
    pub key: DirectoryKey,
    /// Set by Load, cleared by Reset
    pub current_session: Option<String>,
}

impl InvocationScope {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            key: DirectoryKey::resolve(&working_dir),
            working_dir,
            current_session: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Surfaces {
    /// Text the user is composing
    pub prompt: SurfaceHandle,
    /// Conversation transcript as it streams
    pub output: SurfaceHandle,
    pub trace: Option<SurfaceHandle>,
    pub permissions: SurfaceHandle,
    pub sessions: SurfaceHandle,
}

impl Surfaces {
    pub fn get(&self, kind: SurfaceKind) -> &SurfaceHandle {
        match kind {
            SurfaceKind::Output => &self.output,
            SurfaceKind::Permissions => &self.permissions,
            SurfaceKind::Sessions => &self.sessions,
        }
    }
}

pub struct Orchestrator {
    config: Config,
    scope: InvocationScope,
    contexts: ContextManager,
    permissions: PermissionStore,
    locator: SessionLocator,
    invoker: AssistantInvoker,
    surfaces: Surfaces,
}

impl Orchestrator {
    pub fn new(config: Config, working_dir: impl Into<PathBuf>, surfaces: Surfaces) -> Self {
        let store = KeyedStore::new(config.base_dir.clone());

        let mut invoker = AssistantInvoker::new();
        if let Some(limit) = config.timeout() {
            invoker = invoker.with_timeout(limit);
        }
        if config.trace_tail && surfaces.trace.is_some() {
            invoker = invoker.with_debug_tail(DebugTail::new(config.debug_dir.clone()));
        }

        Self {
            contexts: ContextManager::new(store.clone()),
            permissions: PermissionStore::new(
                store,
                config.default_allowed_tools.clone(),
                config.default_permission_mode,
            ),
            locator: SessionLocator::new(config.projects_dir.clone()),
            scope: InvocationScope::new(working_dir),
            invoker,
            surfaces,
            config,
        }
    }

    pub fn scope(&self) -> &InvocationScope {
        &self.scope
    }

    pub fn surfaces(&self) -> &Surfaces {
        &self.surfaces
    }

    pub fn contexts(&self) -> &ContextManager {
        &self.contexts
    }

    pub fn permission_store(&self) -> &PermissionStore {
        &self.permissions
    }

    /// Run a command. Handler errors are written to the command's surface
    /// before being returned.
    pub async fn dispatch(&mut self, command: Command) -> Dispatch {
        let (kind, arg) = match command {
            Command::Known { kind, arg } => (kind, arg),
            pass @ Command::PassThrough { .. } => return Dispatch::PassThrough(pass),
        };
        let Some(handler) = HANDLERS.get(&kind).copied() else {
            return Dispatch::PassThrough(Command::Known { kind, arg });
        };

        tracing::debug!(command = ?kind, dir = %self.scope.working_dir.display(), "Dispatching");
        match handler(self, arg).await {
            Ok(()) => Dispatch::Handled,
            Err(e) => {
                tracing::warn!(command = ?kind, error = %e, "Command failed");
                self.surfaces.get(kind.surface()).append_lossy(&format!("\n[Error: {}]\n", e));
                Dispatch::Failed(e)
            }
        }
    }

    fn trace(&self, text: &str) {
        if let Some(trace) = &self.surfaces.trace {
            trace.append_lossy(text);
        }
    }

    /// Send the argument, or the prompt surface's contents, to the assistant.
    /// On failure nothing is persisted and the text goes back to the prompt.
    pub async fn send(&mut self, arg: Option<String>) -> Result<(), AppError> {
        let text = match arg {
            Some(text) => text,
            None => self.surfaces.prompt.read()?,
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            self.surfaces.output.append(EMPTY_PROMPT_NOTICE)?;
            return Ok(());
        }

        self.surfaces.prompt.clear()?;
        let outcome = self.exchange(&text).await;
        if outcome.is_err() {
            if let Err(e) = self.surfaces.prompt.write(&text) {
                tracing::warn!(error = %e, "Failed to restore prompt text");
            }
        }
        outcome
    }

    async fn exchange(&mut self, text: &str) -> Result<(), AppError> {
        let key = self.scope.key.clone();
        self.surfaces
            .output
            .append(&format!("{}:\n{}\n\n{}:\n", USER_LABEL, text, ASSISTANT_LABEL))?;

        let prompt = self.contexts.build_prompt(&key, text)?;
        self.check_budget(&prompt);

        let profile = self.permissions.load(&key)?;
        let session = self.session_flag()?;

        let mut args = self.config.program_args.clone();
        args.extend(build_args(&profile, &self.config.known_tools, &session));
        self.trace(&format!("Executing {} with args: {:?}\n", self.config.program, args));

        let command = AssistantCommand::new(&self.config.program, args).current_dir(&self.scope.working_dir);
        let sinks = StreamSinks {
            primary: self.surfaces.output.clone(),
            trace: self.surfaces.trace.clone(),
        };
        let result = self.invoker.invoke(&command, prompt, &sinks).await?;

        if let Some(status) = result.exit_error {
            return Err(AppError::AssistantFailed {
                status,
                detail: result.error_text,
            });
        }

        self.contexts.add_exchange(&key, text, &result.response_text)?;
        self.surfaces.output.append(&format!("\n{}\n\n", HISTORY_SEPARATOR))?;
        tracing::info!(dir = %self.scope.working_dir.display(), "Exchange recorded");
        Ok(())
    }

    fn check_budget(&self, prompt: &str) {
        let budget = HistoryBudget::measure(prompt, self.config.history_token_limit);
        if budget.status() == BudgetStatus::OverLimit {
            tracing::warn!(tokens = budget.tokens, limit = budget.limit, "History over token budget");
            self.trace(&format!(
                "[TRACE] History is {} tokens ({}% of {}); Reset to start a fresh context\n",
                budget.tokens,
                budget.usage_percentage(),
                budget.limit
            ));
        }
    }

    /// Loaded session first, then `-c` when configured, then the most recent
    /// transcript, else a fresh session.
    fn session_flag(&self) -> Result<SessionFlag, AppError> {
        if let Some(id) = &self.scope.current_session {
            return Ok(SessionFlag::Resume(id.clone()));
        }
        if self.config.continue_latest {
            return Ok(SessionFlag::Continue);
        }
        let project_dir = self.locator.project_dir_for(&self.scope.working_dir);
        Ok(match self.locator.most_recent(&project_dir)? {
            Some(id) => SessionFlag::Resume(id),
            None => SessionFlag::Fresh,
        })
    }

    pub fn show_permissions(&mut self) -> Result<(), AppError> {
        let profile = self.permissions.load(&self.scope.key)?;
        self.surfaces
            .permissions
            .write(&render_current(&self.scope.working_dir, &profile))?;
        Ok(())
    }

    pub fn edit_permissions(&mut self) -> Result<(), AppError> {
        let profile = self.permissions.load(&self.scope.key)?;
        self.surfaces
            .permissions
            .write(&render_edit_listing(&profile, &self.config.known_tools))?;
        Ok(())
    }

    /// Apply the directives in the argument, or in the permissions surface.
    pub fn save_permissions(&mut self, arg: Option<String>) -> Result<(), AppError> {
        let buffer = match arg {
            Some(buffer) => buffer,
            None => self.surfaces.permissions.read()?,
        };
        let batch = EditBatch::parse(&buffer);
        if batch.is_empty() {
            self.surfaces.permissions.append("\nNo permission changes found\n")?;
            return Ok(());
        }

        self.permissions.apply_edits(&self.scope.key, &batch)?;
        self.surfaces
            .permissions
            .append(&format!("\nPermissions updated\n{}", batch.summary()))?;
        Ok(())
    }

    pub fn set_mode(&mut self, arg: Option<String>) -> Result<(), AppError> {
        let Some(name) = arg else {
            self.surfaces
                .permissions
                .append("\nUsage: Mode default|plan|acceptEdits|bypassPermissions\n")?;
            return Ok(());
        };
        let mode = name.parse()?;
        self.permissions.set_mode(&self.scope.key, mode)?;
        self.show_permissions()
    }

    pub fn list_sessions(&mut self) -> Result<(), AppError> {
        let project_dir = self.locator.project_dir_for(&self.scope.working_dir);
        let sessions = self.locator.list_sessions(&project_dir)?;
        self.surfaces
            .sessions
            .write(&render_listing(&self.scope.working_dir, &sessions))?;
        Ok(())
    }

    pub fn load_session(&mut self, arg: Option<String>) -> Result<(), AppError> {
        let Some(text) = arg else {
            self.surfaces
                .sessions
                .append("\nUsage: select a session id and Load it\n")?;
            return Ok(());
        };
        let id = strip_session_delimiters(&text);
        validate_session_id(id)?;

        self.scope.current_session = Some(id.to_string());
        self.surfaces.sessions.append(&format!("\nLoaded session {}\n", id))?;
        self.trace(&format!("Loaded session {}\n", id));
        tracing::info!(session = %id, "Session loaded");
        Ok(())
    }

    /// Forget the stored history and the loaded session.
    pub fn reset(&mut self) -> Result<(), AppError> {
        let existed = self.contexts.clear_context(&self.scope.key)?;
        self.scope.current_session = None;
        let notice = if existed {
            "\n[Context reset]\n"
        } else {
            "\n[No saved context]\n"
        };
        self.surfaces.output.append(notice)?;
        Ok(())
    }

    pub fn working_dir(&self) -> &Path {
        &self.scope.working_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use crate::permissions::PermissionMode;
    use crate::surface::BufferSurface;
    use tempfile::TempDir;

    const ID: &str = "123e4567-e89b-12d3-a456-426614174000";

    /// Stand-in assistant: echoes its arguments as a diagnostic and replies
    /// with the last prompt line.
    const ECHO_ASSISTANT: &str = r#"echo "[DEBUG] args: $*"; last=$(tail -n 1); echo "reply:$last""#;
    const FAILING_ASSISTANT: &str = r#"cat >/dev/null; echo partial; echo "bad things" >&2; exit 2"#;

    fn surfaces() -> Surfaces {
        Surfaces {
            prompt: SurfaceHandle::new(BufferSurface::new()),
            output: SurfaceHandle::new(BufferSurface::new()),
            trace: Some(SurfaceHandle::new(BufferSurface::new())),
            permissions: SurfaceHandle::new(BufferSurface::new()),
            sessions: SurfaceHandle::new(BufferSurface::new()),
        }
    }

    fn orchestrator(tmp: &TempDir, script: &str) -> Orchestrator {
        let mut config = Config::default().with_base_dir(&tmp.path().join("state"));
        config.program = "sh".to_string();
        config.program_args = vec!["-c".to_string(), script.to_string(), "assistant".to_string()];
        config.projects_dir = tmp.path().join("projects");
        config.trace_tail = false;
        let work = tmp.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        Orchestrator::new(config, work, surfaces())
    }

    fn trace_text(o: &Orchestrator) -> String {
        o.surfaces().trace.as_ref().unwrap().read().unwrap()
    }

    #[tokio::test]
    async fn test_send_streams_and_persists_exchange() {
        let tmp = TempDir::new().unwrap();
        let mut o = orchestrator(&tmp, ECHO_ASSISTANT);
        o.surfaces().prompt.write("  hello\n").unwrap();

        let outcome = o.dispatch(Command::parse("Send", None)).await;
        assert!(matches!(outcome, Dispatch::Handled));

        let output = o.surfaces().output.read().unwrap();
        assert_eq!(output, "USER:\nhello\n\nCLAUDE:\nreply:USER: hello\n\n====================\n\n");
        assert_eq!(o.surfaces().prompt.read().unwrap(), "");

        let trace = trace_text(&o);
        assert!(trace.contains("[DEBUG] args: -p --debug --allowedTools Read --disallowedTools Write,"));
        assert!(trace.contains("--permission-mode acceptEdits"));

        let context = o.contexts().load_context(&o.scope().key).unwrap();
        assert_eq!(context.messages.len(), 2);
        assert_eq!(context.messages[0].role, Role::User);
        assert_eq!(context.messages[0].content, "hello");
        assert_eq!(context.messages[1].content, "reply:USER: hello");
    }

    #[tokio::test]
    async fn test_second_send_carries_history() {
        let tmp = TempDir::new().unwrap();
        let mut o = orchestrator(&tmp, r#"cat; echo; echo done"#);

        assert!(matches!(o.dispatch(Command::parse("Send", Some("first"))).await, Dispatch::Handled));
        assert!(matches!(o.dispatch(Command::parse("Send", Some("second"))).await, Dispatch::Handled));

        let context = o.contexts().load_context(&o.scope().key).unwrap();
        assert_eq!(context.messages.len(), 4);
        assert_eq!(
            context.messages[3].content,
            "USER: first\n\nCLAUDE: USER: first\ndone\n\n====================\n\nUSER: second\ndone"
        );
    }

    #[tokio::test]
    async fn test_failed_send_persists_nothing_and_restores_prompt() {
        let tmp = TempDir::new().unwrap();
        let mut o = orchestrator(&tmp, FAILING_ASSISTANT);
        o.surfaces().prompt.write("keep me").unwrap();

        let outcome = o.dispatch(Command::parse("Send", None)).await;
        match outcome {
            Dispatch::Failed(AppError::AssistantFailed { status, detail }) => {
                assert_eq!(status, ExitError::Status(Some(2)));
                assert_eq!(detail, "bad things");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert_eq!(o.surfaces().prompt.read().unwrap(), "keep me");
        let output = o.surfaces().output.read().unwrap();
        assert!(output.contains("partial\n"));
        assert!(output.contains("[Error: Assistant failed (exit status 2): bad things]"));
        assert!(o.contexts().load_context(&o.scope().key).unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_empty_prompt_is_a_notice() {
        let tmp = TempDir::new().unwrap();
        let mut o = orchestrator(&tmp, FAILING_ASSISTANT);
        o.surfaces().prompt.write("   \n").unwrap();

        assert!(matches!(o.dispatch(Command::parse("Send", None)).await, Dispatch::Handled));
        assert_eq!(o.surfaces().output.read().unwrap(), EMPTY_PROMPT_NOTICE);
    }

    #[tokio::test]
    async fn test_loaded_session_is_resumed() {
        let tmp = TempDir::new().unwrap();
        let mut o = orchestrator(&tmp, ECHO_ASSISTANT);

        let outcome = o.dispatch(Command::parse(&format!("[{}]", ID), None)).await;
        assert!(matches!(outcome, Dispatch::Handled));
        assert_eq!(o.scope().current_session.as_deref(), Some(ID));

        o.dispatch(Command::parse("Send", Some("hi"))).await;
        assert!(trace_text(&o).contains(&format!("args: -p --debug -r {} ", ID)));
    }

    #[tokio::test]
    async fn test_most_recent_transcript_is_resumed() {
        let tmp = TempDir::new().unwrap();
        let mut o = orchestrator(&tmp, ECHO_ASSISTANT);
        let project = tmp.path().join("projects").join(
            tmp.path().join("work").to_string_lossy().replace('/', "-"),
        );
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join(format!("{}.jsonl", ID)), "").unwrap();

        o.dispatch(Command::parse("Send", Some("hi"))).await;
        assert!(trace_text(&o).contains(&format!("-r {}", ID)));
        assert_eq!(o.scope().current_session, None);
    }

    #[tokio::test]
    async fn test_invalid_session_id_fails_on_sessions_surface() {
        let tmp = TempDir::new().unwrap();
        let mut o = orchestrator(&tmp, ECHO_ASSISTANT);

        let outcome = o.dispatch(Command::parse("Load", Some("not-a-uuid"))).await;
        assert!(matches!(
            outcome,
            Dispatch::Failed(AppError::Session(SessionError::InvalidSessionId(_)))
        ));
        assert!(o.surfaces().sessions.read().unwrap().contains("Invalid session ID: not-a-uuid"));
        assert_eq!(o.scope().current_session, None);
    }

    #[tokio::test]
    async fn test_save_and_mode_update_profile() {
        let tmp = TempDir::new().unwrap();
        let mut o = orchestrator(&tmp, ECHO_ASSISTANT);

        o.surfaces().permissions.write("+ Bash\n- Read\nsome listing text\n").unwrap();
        assert!(matches!(o.dispatch(Command::parse("Save", None)).await, Dispatch::Handled));
        assert!(o.surfaces().permissions.read().unwrap().ends_with("Permissions updated\nAllowed: Bash\nDenied: Read\n"));

        assert!(matches!(o.dispatch(Command::parse("plan", None)).await, Dispatch::Handled));
        let profile = o.permission_store().load(&o.scope().key).unwrap();
        assert_eq!(profile.allowed_tools, ["Bash"]);
        assert_eq!(profile.disallowed_tools, ["Read"]);
        assert_eq!(profile.mode(), PermissionMode::Plan);

        let view = o.surfaces().permissions.read().unwrap();
        assert!(view.contains("# PermissionMode: plan\n"));
        assert!(view.ends_with("+ Bash\n- Read\n"));
    }

    #[tokio::test]
    async fn test_unknown_mode_argument_fails() {
        let tmp = TempDir::new().unwrap();
        let mut o = orchestrator(&tmp, ECHO_ASSISTANT);

        let outcome = o.dispatch(Command::parse("Mode", Some("yolo"))).await;
        assert!(matches!(outcome, Dispatch::Failed(AppError::Mode(_))));
    }

    #[tokio::test]
    async fn test_reset_clears_context_and_session() {
        let tmp = TempDir::new().unwrap();
        let mut o = orchestrator(&tmp, ECHO_ASSISTANT);
        o.dispatch(Command::parse("Load", Some(ID))).await;
        o.dispatch(Command::parse("Send", Some("hi"))).await;

        assert!(matches!(o.dispatch(Command::parse("Reset", None)).await, Dispatch::Handled));
        assert_eq!(o.scope().current_session, None);
        assert!(o.contexts().load_context(&o.scope().key).unwrap().messages.is_empty());
        assert!(o.surfaces().output.read().unwrap().ends_with("[Context reset]\n"));
    }

    #[tokio::test]
    async fn test_sessions_listing_and_pass_through() {
        let tmp = TempDir::new().unwrap();
        let mut o = orchestrator(&tmp, ECHO_ASSISTANT);

        assert!(matches!(o.dispatch(Command::parse("Sessions", None)).await, Dispatch::Handled));
        assert!(o.surfaces().sessions.read().unwrap().contains("No sessions found"));

        match o.dispatch(Command::parse("Put", None)).await {
            Dispatch::PassThrough(cmd) => assert_eq!(cmd.to_string(), "Put"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
