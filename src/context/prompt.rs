//! Linearizes history into the text piped to the assistant's stdin.
//!
//! The exact shape here is a wire contract with the assistant: labels,
//! blank-line spacing, the separator, and the missing trailing newline.

use super::history::{Message, Role};

pub const USER_LABEL: &str = "USER";
pub const ASSISTANT_LABEL: &str = "CLAUDE";
pub const HISTORY_SEPARATOR: &str = "====================";

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => USER_LABEL,
            Role::Assistant => ASSISTANT_LABEL,
        }
    }
}

/// Render `messages` followed by the new user turn.
pub fn render_prompt(messages: &[Message], new_user_text: &str) -> String {
    let history_len: usize = messages.iter().map(|m| m.content.len() + 12).sum();
    let mut prompt = String::with_capacity(history_len + new_user_text.len() + 32);

    for message in messages {
        prompt.push_str(message.role.label());
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push_str("\n\n");
    }

    if !messages.is_empty() {
        prompt.push_str(HISTORY_SEPARATOR);
        prompt.push_str("\n\n");
    }

    prompt.push_str(USER_LABEL);
    prompt.push_str(": ");
    prompt.push_str(new_user_text);
    prompt
}
