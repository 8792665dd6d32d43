//! Tests for conversation memory.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use bujji::memory::{
    trim_messages, InMemoryMessageStore, Memory, MessageStore, SessionKey, SqliteMessageStore,
    TokenCounter, TrimOptions, TrimStrategy,
};
use bujji::types::{Message, MessageKind, ToolCallRequest};

/// Every message costs one token.
struct PerMessage;

impl TokenCounter for PerMessage {
    fn count_message(&self, _message: &Message) -> usize {
        1
    }

    fn count_text(&self, text: &str) -> usize {
        usize::from(!text.is_empty())
    }
}

fn contents(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.content.as_str()).collect()
}

fn tool_turn() -> Vec<Message> {
    vec![
        Message::human("what is 6*7?"),
        Message::ai_with_tool_calls(
            "",
            vec![ToolCallRequest {
                id: "call_1".into(),
                name: "calculator".into(),
                arguments: json!({"expression": "6*7"}),
            }],
        ),
        Message::tool("calculator", "call_1", "42"),
        Message::ai("6*7 is 42."),
    ]
}

#[tokio::test]
async fn sqlite_memory_survives_reopen_with_tool_calls_intact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memory.db");
    let session = SessionKey::new("u1", "c1");

    {
        let store: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::open(&path).unwrap());
        let memory = Memory::new(store, session.clone());
        for message in tool_turn() {
            memory.add_message(&message).await.unwrap();
        }
    }

    let store: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::open(&path).unwrap());
    let history = Memory::new(store, session).history().await.unwrap();

    let kinds: Vec<MessageKind> = history.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        [MessageKind::Human, MessageKind::Ai, MessageKind::Tool, MessageKind::Ai]
    );
    assert_eq!(history[1].tool_calls[0].name, "calculator");
    assert_eq!(history[1].tool_calls[0].arguments, json!({"expression": "6*7"}));
    assert_eq!(history[2].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(history[2].tool_name.as_deref(), Some("calculator"));
}

#[tokio::test]
async fn sessions_are_isolated_and_clear_only_touches_one() {
    let store: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::open_in_memory().unwrap());
    let alice = Memory::new(store.clone(), SessionKey::new("alice", "c1"));
    let bob = Memory::new(store.clone(), SessionKey::new("bob", "c1"));

    alice.add_message(&Message::human("hi from alice")).await.unwrap();
    bob.add_message(&Message::human("hi from bob")).await.unwrap();

    assert_eq!(contents(&alice.history().await.unwrap()), ["hi from alice"]);
    alice.clear().await.unwrap();
    assert!(alice.history().await.unwrap().is_empty());
    assert_eq!(contents(&bob.history().await.unwrap()), ["hi from bob"]);
}

#[tokio::test]
async fn trimmed_view_never_starts_mid_turn() {
    let memory = Memory::new(Arc::new(InMemoryMessageStore::new()), SessionKey::new("u", "c"))
        .with_counter(Arc::new(PerMessage))
        .with_max_tokens(5);
    for message in tool_turn().into_iter().chain(tool_turn()) {
        memory.add_message(&message).await.unwrap();
    }

    // The last five messages begin with the first turn's answer, which is
    // dropped so the view opens on the second question.
    let view = memory.load().await.unwrap();
    assert_eq!(view.len(), 4);
    assert_eq!(view[0].kind, MessageKind::Human);
    assert_eq!(memory.history().await.unwrap().len(), 8);
}

#[test]
fn leading_system_message_is_kept() {
    let mut log = vec![Message::system("You are helpful.")];
    log.extend(tool_turn());
    log.push(Message::human("and 7*8?"));

    let view = trim_messages(&log, &TrimOptions::default().with_max_tokens(2), &PerMessage);
    assert_eq!(contents(&view), ["You are helpful.", "and 7*8?"]);
}

#[test]
fn first_strategy_keeps_the_oldest_messages() {
    let options = TrimOptions {
        strategy: TrimStrategy::First,
        ..TrimOptions::default().with_max_tokens(2)
    };
    let view = trim_messages(&tool_turn(), &options, &PerMessage);
    assert_eq!(view.len(), 2);
    assert_eq!(view[0].content, "what is 6*7?");
    assert!(view[1].has_tool_calls());
}

#[test]
fn log_within_budget_is_untouched() {
    let log = tool_turn();
    let view = trim_messages(&log, &TrimOptions::default(), &PerMessage);
    assert_eq!(view, log);
}
