//! Conversation memory: a durable per-session log plus a trimmed view
//! sized for prompting.

pub mod store;
pub mod token;
pub mod trim;

pub use store::{InMemoryMessageStore, MessageStore, SessionKey, SqliteMessageStore};
pub use token::{EstimatingTokenCounter, TokenCounter};
pub use trim::{trim_messages, TrimOptions, TrimStrategy};

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::types::Message;

/// One session's memory, as carried in workflow state.
#[derive(Clone)]
pub struct Memory {
    store: Arc<dyn MessageStore>,
    session: SessionKey,
    options: TrimOptions,
    counter: Arc<dyn TokenCounter>,
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("session", &self.session)
            .field("options", &self.options)
            .finish()
    }
}

impl Memory {
    pub fn new(store: Arc<dyn MessageStore>, session: SessionKey) -> Self {
        Self {
            store,
            session,
            options: TrimOptions::default(),
            counter: Arc::new(EstimatingTokenCounter::default()),
        }
    }

    pub fn with_options(mut self, options: TrimOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.options.max_tokens = max_tokens;
        self
    }

    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn session(&self) -> &SessionKey {
        &self.session
    }

    pub fn options(&self) -> &TrimOptions {
        &self.options
    }

    pub async fn add_message(&self, message: &Message) -> Result<()> {
        self.store.append(&self.session, message).await
    }

    /// The untrimmed log.
    pub async fn history(&self) -> Result<Vec<Message>> {
        self.store.messages(&self.session).await
    }

    /// The trimmed view used for prompting. An empty log is returned as is.
    pub async fn load(&self) -> Result<Vec<Message>> {
        let history = self.history().await?;
        if history.is_empty() {
            return Ok(history);
        }
        let view = trim_messages(&history, &self.options, self.counter.as_ref());
        debug!(
            session = %self.session,
            stored = history.len(),
            kept = view.len(),
            "loaded trimmed memory"
        );
        Ok(view)
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear(&self.session).await
    }
}
