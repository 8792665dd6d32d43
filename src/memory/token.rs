//! Token counting for the trimmed memory view.

use crate::types::Message;

/// Counts the prompt tokens a message costs.
pub trait TokenCounter: Send + Sync {
    fn count_message(&self, message: &Message) -> usize;

    fn count(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }

    /// Tokens in a bare piece of text, used when splitting a message.
    fn count_text(&self, text: &str) -> usize;
}

/// Heuristic counter: about four characters per token plus a fixed
/// per-message overhead for role and framing.
#[derive(Debug, Clone, Copy)]
pub struct EstimatingTokenCounter {
    pub chars_per_token: usize,
    pub message_overhead: usize,
}

impl Default for EstimatingTokenCounter {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            message_overhead: 4,
        }
    }
}

impl TokenCounter for EstimatingTokenCounter {
    fn count_message(&self, message: &Message) -> usize {
        let mut tokens = self.message_overhead + self.count_text(&message.content);
        for call in &message.tool_calls {
            let args = serde_json::to_string(&call.arguments).unwrap_or_default();
            tokens += self.count_text(&call.name) + self.count_text(&args) + 8;
        }
        if let Some(id) = &message.tool_call_id {
            tokens += self.count_text(id);
        }
        tokens
    }

    fn count_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        text.chars().count().div_ceil(self.chars_per_token.max(1))
    }
}
