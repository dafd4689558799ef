//! Context Management Module
//!
//! Owns the per-directory conversation history and renders it, together with
//! a new user turn, into the single text prompt handed to the assistant.

pub mod budget;
pub mod history;
pub mod prompt;

pub use budget::{count_tokens, estimate_tokens_quick, BudgetStatus, HistoryBudget, DEFAULT_HISTORY_TOKEN_LIMIT};
pub use history::{ContextManager, ConversationContext, Message, Role};
pub use prompt::{render_prompt, ASSISTANT_LABEL, HISTORY_SEPARATOR, USER_LABEL};
