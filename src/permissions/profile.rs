//! Tool permission profile persisted per working directory.

use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use super::directives::EditBatch;
use crate::store::{DirectoryKey, DocumentKind, KeyedStore, StoreError};

/// Tools the assistant is known to offer. Anything in here that is not
/// explicitly allowed is passed to the assistant as disallowed.
pub const DEFAULT_KNOWN_TOOLS: &[&str] = &[
    "Read", "Write", "Edit", "MultiEdit", "NotebookEdit",
    "Glob", "Grep", "Bash", "BashOutput", "KillBash",
    "WebSearch", "WebFetch", "Task", "TodoWrite", "ExitPlanMode",
    "Bash(git:*)", "Bash(mkdir:*)", "Bash(ls:*)", "Bash(cd:*)",
    "Bash(cp:*)", "Bash(mv:*)", "Bash(rm:*)", "Bash(chmod:*)",
];

/// Seed for directories that have never saved a profile
pub const DEFAULT_ALLOWED_TOOLS: &[&str] = &["Read"];

/// Coarse autonomy policy passed via `--permission-mode`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    #[default]
    Default,
    Plan,
    AcceptEdits,
    BypassPermissions,
}

impl PermissionMode {
    pub const ALL: [PermissionMode; 4] = [
        PermissionMode::Default,
        PermissionMode::Plan,
        PermissionMode::AcceptEdits,
        PermissionMode::BypassPermissions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::Plan => "plan",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown permission mode: {}", self.0)
    }
}

impl std::error::Error for UnknownMode {}

impl FromStr for PermissionMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// Main structure persisted to permissions.json
///
/// The tool lists behave as sets but keep insertion order so the file and
/// the rendered views stay stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PermissionProfile {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disallowed_tools: Vec<String>,
    #[serde(default, deserialize_with = "empty_mode_as_none", skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<PermissionMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_dirs: Vec<String>,
}

/// `""`, `null` and `"default"` all mean no explicit mode.
fn empty_mode_as_none<'de, D>(deserializer: D) -> Result<Option<PermissionMode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) => match name.parse().map_err(de::Error::custom)? {
            PermissionMode::Default => Ok(None),
            mode => Ok(Some(mode)),
        },
    }
}

impl PermissionProfile {
    pub fn seeded(allowed: &[String], mode: PermissionMode) -> Self {
        let mut profile = Self::default();
        for tool in allowed {
            profile.allow(tool);
        }
        profile.set_mode(mode);
        profile
    }

    pub fn allow(&mut self, tool: &str) {
        if !self.allowed_tools.iter().any(|t| t == tool) {
            self.allowed_tools.push(tool.to_string());
        }
        self.disallowed_tools.retain(|t| t != tool);
    }

    pub fn deny(&mut self, tool: &str) {
        if !self.disallowed_tools.iter().any(|t| t == tool) {
            self.disallowed_tools.push(tool.to_string());
        }
        self.allowed_tools.retain(|t| t != tool);
    }

    pub fn forget(&mut self, tool: &str) {
        self.allowed_tools.retain(|t| t != tool);
        self.disallowed_tools.retain(|t| t != tool);
    }

    /// `default` is stored as an absent mode.
    pub fn set_mode(&mut self, mode: PermissionMode) {
        self.permission_mode = match mode {
            PermissionMode::Default => None,
            other => Some(other),
        };
    }

    pub fn mode(&self) -> PermissionMode {
        self.permission_mode.unwrap_or_default()
    }

    /// Tools passed as `--allowedTools`, in insertion order.
    pub fn effective_allowed(&self) -> &[String] {
        &self.allowed_tools
    }

    pub fn is_allowed(&self, tool: &str) -> bool {
        self.allowed_tools.iter().any(|t| t == tool)
    }

    /// Default-deny: every catalog tool not explicitly allowed, followed by
    /// explicitly denied tools the catalog does not list.
    pub fn compute_disallowed<S: AsRef<str>>(&self, known_tools: &[S]) -> Vec<String> {
        let mut disallowed: Vec<String> = known_tools
            .iter()
            .map(AsRef::as_ref)
            .filter(|tool| !self.is_allowed(tool))
            .map(str::to_string)
            .collect();

        for tool in &self.disallowed_tools {
            if !disallowed.contains(tool) {
                disallowed.push(tool.clone());
            }
        }
        disallowed
    }
}

/// Loads and persists profiles, falling back to the configured seed.
#[derive(Debug, Clone)]
pub struct PermissionStore {
    store: KeyedStore,
    seed_tools: Vec<String>,
    seed_mode: PermissionMode,
}

impl PermissionStore {
    pub fn new(store: KeyedStore, seed_tools: Vec<String>, seed_mode: PermissionMode) -> Self {
        Self {
            store,
            seed_tools,
            seed_mode,
        }
    }

    pub fn default_profile(&self) -> PermissionProfile {
        PermissionProfile::seeded(&self.seed_tools, self.seed_mode)
    }

    pub fn load(&self, key: &DirectoryKey) -> Result<PermissionProfile, StoreError> {
        self.store
            .load_or(key, DocumentKind::Permissions, || self.default_profile())
    }

    pub fn save(&self, key: &DirectoryKey, profile: &PermissionProfile) -> Result<(), StoreError> {
        self.store.save(key, DocumentKind::Permissions, profile)
    }

    /// Apply a parsed edit batch and persist immediately.
    pub fn apply_edits(&self, key: &DirectoryKey, batch: &EditBatch) -> Result<PermissionProfile, StoreError> {
        let mut profile = self.load(key)?;
        batch.apply(&mut profile);
        self.save(key, &profile)?;

        tracing::info!(
            key = %key,
            allowed = batch.allow.len(),
            denied = batch.deny.len(),
            forgotten = batch.forget.len(),
            "Applied permission edits"
        );
        Ok(profile)
    }

    pub fn set_mode(&self, key: &DirectoryKey, mode: PermissionMode) -> Result<PermissionProfile, StoreError> {
        let mut profile = self.load(key)?;
        profile.set_mode(mode);
        self.save(key, &profile)?;
        Ok(profile)
    }
}
