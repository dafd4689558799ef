//! Tool Permission Module
//!
//! Per-directory allow/deny policy, the edit-directive parser that mutates it,
//! and the derived argument set handed to the assistant.

pub mod directives;
pub mod profile;
pub mod view;

pub use directives::EditBatch;
pub use profile::{
    PermissionMode, PermissionProfile, PermissionStore, UnknownMode, DEFAULT_ALLOWED_TOOLS, DEFAULT_KNOWN_TOOLS,
};
pub use view::{render_current, render_edit_listing};
