//! Text renderings of a profile for the permissions surface.
//!
//! Both views are valid edit buffers: saving them back unchanged is a no-op.

use std::fmt::Write as _;
use std::path::Path;

use super::profile::{PermissionMode, PermissionProfile};

pub fn render_current(working_dir: &Path, profile: &PermissionProfile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Active permissions for: {}", working_dir.display());
    let _ = writeln!(out, "# PermissionMode: {}", profile.mode());
    if !profile.additional_dirs.is_empty() {
        let _ = writeln!(out, "# Additional directories: {}", profile.additional_dirs.join(", "));
    }
    out.push('\n');

    out.push_str("Mode: ");
    for mode in PermissionMode::ALL {
        let _ = write!(out, "[{}] ", mode);
    }
    out.push_str("\n\n");

    for tool in &profile.allowed_tools {
        let _ = writeln!(out, "+ {}", tool);
    }
    for tool in &profile.disallowed_tools {
        let _ = writeln!(out, "- {}", tool);
    }
    out
}

pub fn render_edit_listing<S: AsRef<str>>(profile: &PermissionProfile, known_tools: &[S]) -> String {
    let mut out = String::from("# Available tools to grant - edit with + to allow, - to deny, ~ to remove\n\n");
    for tool in known_tools.iter().map(AsRef::as_ref) {
        if !profile.is_allowed(tool) {
            let _ = writeln!(out, "  {}", tool);
        }
    }
    out
}
