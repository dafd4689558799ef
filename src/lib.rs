// Claude Acme Library
// Exports core modules for use by both the launcher and the CLI binary

pub mod commands;
pub mod config;
pub mod context;
pub mod invoker;
pub mod logging;
pub mod orchestrator;
pub mod permissions;
pub mod sessions;
pub mod store;
pub mod surface;
pub mod trace;

// Re-export commonly used types for the binaries
pub use commands::{Command, CommandKind, SurfaceKind};
pub use config::{Config, ConfigError};
pub use context::{
    count_tokens, BudgetStatus, ContextManager, ConversationContext, HistoryBudget, Message, Role,
};
pub use invoker::{
    build_args, AssistantCommand, AssistantInvoker, ExitError, InvocationResult, InvokeError, SessionFlag,
    StreamSinks,
};
pub use orchestrator::{AppError, Dispatch, InvocationScope, Orchestrator, Surfaces};
pub use permissions::{
    render_current, render_edit_listing, EditBatch, PermissionMode, PermissionProfile, PermissionStore,
};
pub use sessions::{Session, SessionError, SessionLocator};
pub use store::{DirectoryKey, DocumentKind, KeyedStore, StoreError};
pub use surface::{BufferSurface, ConsoleSurface, SurfaceHandle, TextSurface};
pub use trace::DebugTail;
