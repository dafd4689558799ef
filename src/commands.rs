//! Editor commands
//!
//! Command names arriving from the editor are parsed once into `Command`;
//! known kinds are dispatched through `HANDLERS`, anything else is handed
//! back to the caller untouched.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::orchestrator::{AppError, Orchestrator};
use crate::permissions::PermissionMode;
use crate::sessions::{is_uuid, strip_session_delimiters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Send,
    /// Show the active profile
    Permissions,
    Edit,
    Save,
    SetMode,
    Sessions,
    Refresh,
    Load,
    Reset,
}

/// Which surface a command reports to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Output,
    Permissions,
    Sessions,
}

impl CommandKind {
    pub fn surface(self) -> SurfaceKind {
        match self {
            CommandKind::Send | CommandKind::Reset => SurfaceKind::Output,
            CommandKind::Permissions | CommandKind::Edit | CommandKind::Save | CommandKind::SetMode => {
                SurfaceKind::Permissions
            }
            CommandKind::Sessions | CommandKind::Refresh | CommandKind::Load => SurfaceKind::Sessions,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Send" => CommandKind::Send,
            "Permissions" | "Show" => CommandKind::Permissions,
            "Edit" => CommandKind::Edit,
            "Save" => CommandKind::Save,
            "Mode" => CommandKind::SetMode,
            "Sessions" => CommandKind::Sessions,
            "Refresh" => CommandKind::Refresh,
            "Load" => CommandKind::Load,
            "Reset" => CommandKind::Reset,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Known { kind: CommandKind, arg: Option<String> },
    PassThrough { name: String, arg: Option<String> },
}

impl Command {
    /// Parse an executed name and its optional argument. A mode name is a
    /// `SetMode`, a bare session id is a `Load`.
    pub fn parse(name: &str, arg: Option<&str>) -> Self {
        let name = name.trim();
        let arg = arg.map(str::trim).filter(|a| !a.is_empty()).map(str::to_string);

        if let Some(kind) = CommandKind::from_name(name) {
            return Command::Known { kind, arg };
        }
        if let Ok(mode) = name.parse::<PermissionMode>() {
            return Command::Known {
                kind: CommandKind::SetMode,
                arg: Some(mode.to_string()),
            };
        }
        let stripped = strip_session_delimiters(name);
        if is_uuid(stripped) {
            return Command::Known {
                kind: CommandKind::Load,
                arg: Some(stripped.to_string()),
            };
        }

        Command::PassThrough {
            name: name.to_string(),
            arg,
        }
    }

    pub fn kind(&self) -> Option<CommandKind> {
        match self {
            Command::Known { kind, .. } => Some(*kind),
            Command::PassThrough { .. } => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, arg) = match self {
            Command::Known { kind, arg } => (format!("{:?}", kind), arg),
            Command::PassThrough { name, arg } => (name.clone(), arg),
        };
        match arg {
            Some(arg) => write!(f, "{} {}", name, arg),
            None => f.write_str(&name),
        }
    }
}

pub type Handler = for<'a> fn(&'a mut Orchestrator, Option<String>) -> BoxFuture<'a, Result<(), AppError>>;

fn send<'a>(o: &'a mut Orchestrator, arg: Option<String>) -> BoxFuture<'a, Result<(), AppError>> {
    Box::pin(o.send(arg))
}

fn show_permissions<'a>(o: &'a mut Orchestrator, _arg: Option<String>) -> BoxFuture<'a, Result<(), AppError>> {
    Box::pin(async move { o.show_permissions() })
}

fn edit_permissions<'a>(o: &'a mut Orchestrator, _arg: Option<String>) -> BoxFuture<'a, Result<(), AppError>> {
    Box::pin(async move { o.edit_permissions() })
}

fn save_permissions<'a>(o: &'a mut Orchestrator, arg: Option<String>) -> BoxFuture<'a, Result<(), AppError>> {
    Box::pin(async move { o.save_permissions(arg) })
}

fn set_mode<'a>(o: &'a mut Orchestrator, arg: Option<String>) -> BoxFuture<'a, Result<(), AppError>> {
    Box::pin(async move { o.set_mode(arg) })
}

fn list_sessions<'a>(o: &'a mut Orchestrator, _arg: Option<String>) -> BoxFuture<'a, Result<(), AppError>> {
    Box::pin(async move { o.list_sessions() })
}

fn load_session<'a>(o: &'a mut Orchestrator, arg: Option<String>) -> BoxFuture<'a, Result<(), AppError>> {
    Box::pin(async move { o.load_session(arg) })
}

fn reset<'a>(o: &'a mut Orchestrator, _arg: Option<String>) -> BoxFuture<'a, Result<(), AppError>> {
    Box::pin(async move { o.reset() })
}

pub static HANDLERS: LazyLock<HashMap<CommandKind, Handler>> = LazyLock::new(|| {
    let table: [(CommandKind, Handler); 9] = [
        (CommandKind::Send, send),
        (CommandKind::Permissions, show_permissions),
        (CommandKind::Edit, edit_permissions),
        (CommandKind::Save, save_permissions),
        (CommandKind::SetMode, set_mode),
        (CommandKind::Sessions, list_sessions),
        (CommandKind::Refresh, list_sessions),
        (CommandKind::Load, load_session),
        (CommandKind::Reset, reset),
    ];
    table.into_iter().collect()
});
