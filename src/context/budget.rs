//! History token budget.
//!
//! History is never trimmed; the budget only reports when a prompt has grown
//! past the configured limit so the user can decide to reset.
//! Uses cl100k_base encoding, falling back to a character estimate.

use serde::Serialize;
use std::sync::OnceLock;
use tiktoken_rs::{cl100k_base, CoreBPE};

pub const DEFAULT_HISTORY_TOKEN_LIMIT: u32 = 100_000;

static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn encoder() -> Option<&'static CoreBPE> {
    ENCODER
        .get_or_init(|| match cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                tracing::warn!(error = %e, "Token encoder unavailable, using estimates");
                None
            }
        })
        .as_ref()
}

/// Quick estimate: ~4 chars per token on average
pub fn estimate_tokens_quick(text: &str) -> u32 {
    (text.len() as f64 / 4.0).ceil() as u32
}

pub fn count_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    match encoder() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u32,
        None => estimate_tokens_quick(text),
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Normal,
    OverLimit,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryBudget {
    pub tokens: u32,
    pub limit: u32,
}

impl HistoryBudget {
    pub fn measure(prompt: &str, limit: u32) -> Self {
        Self {
            tokens: count_tokens(prompt),
            limit,
        }
    }

    pub fn status(&self) -> BudgetStatus {
        if self.tokens > self.limit {
            BudgetStatus::OverLimit
        } else {
            BudgetStatus::Normal
        }
    }

    pub fn usage_percentage(&self) -> u8 {
        if self.limit == 0 {
            return 100;
        }
        ((self.tokens as f64 / self.limit as f64) * 100.0).min(100.0) as u8
    }
}
