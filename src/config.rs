//! Configuration
//!
//! Read from `<base>/config.json` when present. The base directory is
//! `$CLAUDE_ACME_HOME`, falling back to `~/.claude-acme`. Every field has a
//! default, so a missing file is the same as `{}`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::context::DEFAULT_HISTORY_TOKEN_LIMIT;
use crate::permissions::{PermissionMode, DEFAULT_ALLOWED_TOOLS, DEFAULT_KNOWN_TOOLS};

pub const HOME_ENV: &str = "CLAUDE_ACME_HOME";
pub const CONFIG_FILE: &str = "config.json";
const BASE_DIR_NAME: &str = ".claude-acme";
const DEFAULT_PROGRAM: &str = "claude";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHomeDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Where per-directory state lives; never read from the file itself
    #[serde(skip)]
    pub base_dir: PathBuf,
    pub program: String,
    /// Leading arguments, for launching the assistant through a wrapper
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub program_args: Vec<String>,
    /// The assistant's transcript root
    pub projects_dir: PathBuf,
    /// The assistant's debug log directory
    pub debug_dir: PathBuf,
    pub known_tools: Vec<String>,
    pub default_allowed_tools: Vec<String>,
    pub default_permission_mode: PermissionMode,
    pub history_token_limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation_timeout_secs: Option<u64>,
    pub continue_latest: bool,
    pub trace_tail: bool,
}

impl Default for Config {
    fn default() -> Self {
        let assistant_home = dirs::home_dir().unwrap_or_default().join(".claude");
        Self {
            base_dir: PathBuf::from(BASE_DIR_NAME),
            program: DEFAULT_PROGRAM.to_string(),
            program_args: Vec::new(),
            projects_dir: assistant_home.join("projects"),
            debug_dir: assistant_home.join("debug"),
            known_tools: DEFAULT_KNOWN_TOOLS.iter().map(|t| t.to_string()).collect(),
            default_allowed_tools: DEFAULT_ALLOWED_TOOLS.iter().map(|t| t.to_string()).collect(),
            default_permission_mode: PermissionMode::AcceptEdits,
            history_token_limit: DEFAULT_HISTORY_TOKEN_LIMIT,
            invocation_timeout_secs: None,
            continue_latest: false,
            trace_tail: true,
        }
    }
}

/// `$CLAUDE_ACME_HOME` or `~/.claude-acme`
pub fn default_base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(BASE_DIR_NAME))
        .ok_or(ConfigError::NoHomeDir)
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(default_base_dir()?)
    }

    pub fn load_from(base_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let base_dir = base_dir.into();
        let path = base_dir.join(CONFIG_FILE);

        let mut config = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<Config>(&text)
                .map_err(|source| ConfigError::Parse { path: path.clone(), source })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        config.base_dir = base_dir;

        tracing::debug!(path = %path.display(), program = %config.program, "Loaded config");
        Ok(config)
    }

    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.invocation_timeout_secs.map(Duration::from_secs)
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_base_dir(mut self, base_dir: &Path) -> Self {
        self.base_dir = base_dir.to_path_buf();
        self
    }
}
