//! Conversation history persisted per working directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::prompt::render_prompt;
use crate::store::{DirectoryKey, DocumentKind, KeyedStore, StoreError};

/// Who produced a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Main structure persisted to context.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(alias = "last_used", default = "Utc::now")]
    pub last_used: DateTime<Utc>,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            last_used: Utc::now(),
        }
    }
}

/// Owns the conversation history for every directory key.
///
/// History is append-only and never trimmed.
#[derive(Debug, Clone)]
pub struct ContextManager {
    store: KeyedStore,
}

impl ContextManager {
    pub fn new(store: KeyedStore) -> Self {
        Self { store }
    }

    pub fn load_context(&self, key: &DirectoryKey) -> Result<ConversationContext, StoreError> {
        self.store
            .load_or(key, DocumentKind::Context, ConversationContext::default)
    }

    fn save_context(&self, key: &DirectoryKey, context: &mut ConversationContext) -> Result<(), StoreError> {
        context.last_used = Utc::now();
        self.store.save(key, DocumentKind::Context, context)
    }

    pub fn add_message(&self, key: &DirectoryKey, role: Role, content: &str) -> Result<(), StoreError> {
        let mut context = self.load_context(key)?;
        context.messages.push(Message::new(role, content));
        self.save_context(key, &mut context)
    }

    /// Append a completed user/assistant turn with a single load and save.
    pub fn add_exchange(&self, key: &DirectoryKey, user: &str, reply: &str) -> Result<(), StoreError> {
        let mut context = self.load_context(key)?;
        context.messages.push(Message::new(Role::User, user));
        context.messages.push(Message::new(Role::Assistant, reply));
        self.save_context(key, &mut context)?;

        tracing::debug!(key = %key, messages = context.messages.len(), "Recorded exchange");
        Ok(())
    }

    /// Render stored history plus the new user turn into the stdin prompt.
    pub fn build_prompt(&self, key: &DirectoryKey, new_user_text: &str) -> Result<String, StoreError> {
        let context = self.load_context(key)?;
        Ok(render_prompt(&context.messages, new_user_text))
    }

    /// Delete the persisted history. Returns whether a document existed.
    pub fn clear_context(&self, key: &DirectoryKey) -> Result<bool, StoreError> {
        self.store.remove(key, DocumentKind::Context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn manager(tmp: &TempDir) -> (ContextManager, DirectoryKey) {
        let store = KeyedStore::new(tmp.path());
        (ContextManager::new(store), DirectoryKey::resolve(Path::new("/work/project")))
    }

    #[test]
    fn test_first_load_is_empty() {
        let tmp = TempDir::new().unwrap();
        let (contexts, key) = manager(&tmp);
        assert!(contexts.load_context(&key).unwrap().messages.is_empty());
    }

    #[test]
    fn test_add_message_then_build_prompt() {
        let tmp = TempDir::new().unwrap();
        let (contexts, key) = manager(&tmp);

        contexts.add_message(&key, Role::User, "a").unwrap();
        contexts.add_message(&key, Role::Assistant, "b").unwrap();

        let prompt = contexts.build_prompt(&key, "c").unwrap();
        assert_eq!(prompt, "USER: a\n\nCLAUDE: b\n\n====================\n\nUSER: c");
    }

    #[test]
    fn test_add_exchange_preserves_order() {
        let tmp = TempDir::new().unwrap();
        let (contexts, key) = manager(&tmp);

        contexts.add_exchange(&key, "first question", "first answer").unwrap();
        contexts.add_exchange(&key, "second question", "second answer").unwrap();

        let context = contexts.load_context(&key).unwrap();
        let contents: Vec<_> = context.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first question", "first answer", "second question", "second answer"]);
        assert_eq!(context.messages[1].role, Role::Assistant);
    }

    #[test]
    fn test_round_trip_with_unicode() {
        let tmp = TempDir::new().unwrap();
        let (contexts, key) = manager(&tmp);

        contexts.add_message(&key, Role::User, "¿qué tal? 🚀").unwrap();
        let loaded = contexts.load_context(&key).unwrap();
        assert_eq!(loaded.messages[0].content, "¿qué tal? 🚀");

        let raw = std::fs::read_to_string(
            KeyedStore::new(tmp.path()).path_for(&key, DocumentKind::Context),
        )
        .unwrap();
        assert!(raw.contains("\"lastUsed\""));
        assert!(raw.contains("\"role\": \"user\""));
    }

    #[test]
    fn test_accepts_snake_case_last_used() {
        let tmp = TempDir::new().unwrap();
        let (contexts, key) = manager(&tmp);
        let store = KeyedStore::new(tmp.path());
        std::fs::create_dir_all(store.dir_for(&key)).unwrap();
        std::fs::write(
            store.path_for(&key, DocumentKind::Context),
            r#"{"messages":[{"role":"user","content":"hi","timestamp":"2025-01-01T00:00:00Z"}],"last_used":"2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let context = contexts.load_context(&key).unwrap();
        assert_eq!(context.messages.len(), 1);
    }

    #[test]
    fn test_clear_context() {
        let tmp = TempDir::new().unwrap();
        let (contexts, key) = manager(&tmp);

        assert!(!contexts.clear_context(&key).unwrap());
        contexts.add_message(&key, Role::User, "hello").unwrap();
        assert!(contexts.clear_context(&key).unwrap());
        assert!(contexts.load_context(&key).unwrap().messages.is_empty());
        assert_eq!(contexts.build_prompt(&key, "x").unwrap(), "USER: x");
    }
}
