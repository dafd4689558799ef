//! Claude Acme CLI
//!
//! Command-line interface for the per-directory state: context, permissions
//! and assistant sessions. Prints JSON for use by scripts and editor hooks.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use claude_acme_lib::{
    build_args, logging, BudgetStatus, Config, ContextManager, DirectoryKey, EditBatch, HistoryBudget, KeyedStore,
    Message, PermissionMode, PermissionProfile, PermissionStore, Session, SessionFlag, SessionLocator,
};

#[derive(Parser)]
#[command(name = "claude-acme-cli")]
#[command(about = "Claude Acme CLI - per-directory context, permissions and sessions", long_about = None)]
struct Cli {
    /// Working directory (defaults to the current directory)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,
    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the state key and directory for a path
    Key {
        /// Directory to resolve
        path: PathBuf,
    },
    /// Conversation history commands
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },
    /// Tool permission commands
    Permissions {
        #[command(subcommand)]
        action: PermissionsAction,
    },
    /// Assistant session commands
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Subcommand)]
enum ContextAction {
    /// Show stored history
    Show,
    /// Build the prompt that would be sent for a new turn
    Prompt {
        /// New user text (or - to read from stdin)
        text: String,
    },
    /// Delete stored history
    Reset,
}

#[derive(Subcommand)]
enum PermissionsAction {
    /// Show the stored profile
    Show,
    /// Apply +tool / -tool / ~tool directives
    Edit {
        /// Directive buffer (or - to read from stdin)
        buffer: String,
    },
    /// Set the permission mode
    Mode {
        /// default, plan, acceptEdits or bypassPermissions
        mode: String,
    },
    /// Show the tool policy and arguments the assistant would be launched with
    Effective,
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List sessions, most recent first
    List,
    /// Print the most recent session id
    Latest,
}

// ============ Output Types ============

#[derive(Serialize)]
struct KeyOutput {
    path: String,
    key: String,
    state_dir: String,
}

#[derive(Serialize)]
struct ContextOutput {
    key: String,
    message_count: usize,
    last_used: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct PromptOutput {
    prompt: String,
    tokens: u32,
    limit: u32,
    over_limit: bool,
}

#[derive(Serialize)]
struct ResetOutput {
    cleared: bool,
}

#[derive(Serialize)]
struct ProfileOutput {
    allowed_tools: Vec<String>,
    disallowed_tools: Vec<String>,
    permission_mode: String,
    additional_dirs: Vec<String>,
}

impl From<&PermissionProfile> for ProfileOutput {
    fn from(profile: &PermissionProfile) -> Self {
        Self {
            allowed_tools: profile.allowed_tools.clone(),
            disallowed_tools: profile.disallowed_tools.clone(),
            permission_mode: profile.mode().to_string(),
            additional_dirs: profile.additional_dirs.clone(),
        }
    }
}

#[derive(Serialize)]
struct EditOutput {
    changed: bool,
    summary: String,
    profile: ProfileOutput,
}

#[derive(Serialize)]
struct EffectiveOutput {
    allowed_tools: Vec<String>,
    disallowed_tools: Vec<String>,
    permission_mode: String,
    args: Vec<String>,
}

#[derive(Serialize)]
struct LatestOutput {
    id: Option<String>,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

/// Resolved configuration for one working directory
struct Env {
    config: Config,
    working_dir: PathBuf,
    key: DirectoryKey,
}

impl Env {
    fn load(dir: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let working_dir = match dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        let working_dir = working_dir.canonicalize()?;
        Ok(Self {
            key: DirectoryKey::resolve(&working_dir),
            config,
            working_dir,
        })
    }

    fn store(&self) -> KeyedStore {
        KeyedStore::new(self.config.base_dir.clone())
    }

    fn permissions(&self) -> PermissionStore {
        PermissionStore::new(
            self.store(),
            self.config.default_allowed_tools.clone(),
            self.config.default_permission_mode,
        )
    }

    fn locator(&self) -> SessionLocator {
        SessionLocator::new(self.config.projects_dir.clone())
    }
}

fn read_arg(text: String) -> Result<String, Box<dyn std::error::Error>> {
    if text != "-" {
        return Ok(text);
    }
    use std::io::Read;
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}

// ============ Main ============

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Key { path } => handle_key(&path),
        Commands::Context { action } => Env::load(cli.dir).and_then(|env| handle_context(&env, action)),
        Commands::Permissions { action } => Env::load(cli.dir).and_then(|env| handle_permissions(&env, action)),
        Commands::Sessions { action } => Env::load(cli.dir).and_then(|env| handle_sessions(&env, action)),
    };

    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let error = ErrorOutput { error: e.to_string() };
            let json = serde_json::to_string(&error).unwrap_or_else(|_| r#"{"error":"unknown"}"#.to_string());
            println!("{}", json);
            std::process::exit(1);
        }
    }
}

// ============ Handlers ============

fn handle_key(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let path = path.canonicalize()?;
    let key = DirectoryKey::resolve(&path);
    let state_dir = KeyedStore::new(config.base_dir).dir_for(&key);

    let output = KeyOutput {
        path: path.display().to_string(),
        key: key.to_string(),
        state_dir: state_dir.display().to_string(),
    };
    Ok(serde_json::to_string(&output)?)
}

fn handle_context(env: &Env, action: ContextAction) -> Result<String, Box<dyn std::error::Error>> {
    let contexts = ContextManager::new(env.store());

    match action {
        ContextAction::Show => {
            let context = contexts.load_context(&env.key)?;
            let output = ContextOutput {
                key: env.key.to_string(),
                message_count: context.messages.len(),
                last_used: context.last_used.to_rfc3339(),
                messages: context.messages,
            };
            Ok(serde_json::to_string(&output)?)
        }

        ContextAction::Prompt { text } => {
            let text = read_arg(text)?;
            let prompt = contexts.build_prompt(&env.key, text.trim())?;
            let budget = HistoryBudget::measure(&prompt, env.config.history_token_limit);
            let output = PromptOutput {
                tokens: budget.tokens,
                limit: budget.limit,
                over_limit: budget.status() == BudgetStatus::OverLimit,
                prompt,
            };
            Ok(serde_json::to_string(&output)?)
        }

        ContextAction::Reset => {
            let cleared = contexts.clear_context(&env.key)?;
            Ok(serde_json::to_string(&ResetOutput { cleared })?)
        }
    }
}

fn handle_permissions(env: &Env, action: PermissionsAction) -> Result<String, Box<dyn std::error::Error>> {
    let store = env.permissions();

    match action {
        PermissionsAction::Show => {
            let profile = store.load(&env.key)?;
            Ok(serde_json::to_string(&ProfileOutput::from(&profile))?)
        }

        PermissionsAction::Edit { buffer } => {
            let batch = EditBatch::parse(&read_arg(buffer)?);
            let profile = if batch.is_empty() {
                store.load(&env.key)?
            } else {
                store.apply_edits(&env.key, &batch)?
            };
            let output = EditOutput {
                changed: !batch.is_empty(),
                summary: batch.summary(),
                profile: ProfileOutput::from(&profile),
            };
            Ok(serde_json::to_string(&output)?)
        }

        PermissionsAction::Mode { mode } => {
            let mode: PermissionMode = mode.parse()?;
            let profile = store.set_mode(&env.key, mode)?;
            Ok(serde_json::to_string(&ProfileOutput::from(&profile))?)
        }

        PermissionsAction::Effective => {
            let profile = store.load(&env.key)?;
            let output = EffectiveOutput {
                allowed_tools: profile.effective_allowed().to_vec(),
                disallowed_tools: profile.compute_disallowed(&env.config.known_tools),
                permission_mode: profile.mode().to_string(),
                args: build_args(&profile, &env.config.known_tools, &SessionFlag::Fresh),
            };
            Ok(serde_json::to_string(&output)?)
        }
    }
}

fn handle_sessions(env: &Env, action: SessionsAction) -> Result<String, Box<dyn std::error::Error>> {
    let locator = env.locator();
    let project_dir = locator.project_dir_for(&env.working_dir);

    match action {
        SessionsAction::List => {
            let sessions: Vec<Session> = locator.list_sessions(&project_dir)?;
            Ok(serde_json::to_string(&sessions)?)
        }

        SessionsAction::Latest => {
            let id = locator.most_recent(&project_dir)?;
            Ok(serde_json::to_string(&LatestOutput { id })?)
        }
    }
}
