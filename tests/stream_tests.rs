//! Tests for the chat event stream.

mod common;

use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;

use async_trait::async_trait;

use bujji::config::{BujjiConfig, WorkflowSettings};
use bujji::error::BujjiError;
use bujji::error::FaultClass;
use bujji::memory::{InMemoryMessageStore, MessageStore};
use bujji::stream::{ChatEvent, ChatService, RunRequest, TurnDocument, TurnStatus};
use bujji::tools::builtin::vector_db_tool;
use bujji::tools::ToolRegistry;
use bujji::vector::{
    HashingEmbedder, InMemoryVectorStore, ScoredChunk, VectorEntry, VectorSelector, VectorStore,
};

use common::{call, engine, stored, text, FailingStore, MockProvider, Reply};

fn service(provider: Arc<MockProvider>, store: Arc<dyn MessageStore>) -> ChatService {
    ChatService::new(engine(provider, store, true))
}

async fn collect(service: &ChatService, request: RunRequest) -> Vec<ChatEvent> {
    service.run(request).collect().await
}

fn names(events: &[ChatEvent]) -> Vec<&'static str> {
    events.iter().map(ChatEvent::name).collect()
}

fn position(events: &[ChatEvent], name: &str) -> usize {
    events.iter().position(|e| e.name() == name).unwrap()
}

#[tokio::test]
async fn arithmetic_turn_streams_tools_then_answer() {
    let provider = MockProvider::new(vec![
        Reply::ToolCalls(vec![call("call_1", "calculator", json!({"expression": "2+2"}))]),
        text("2 + 2 equals 4."),
    ]);
    let service = service(provider, Arc::new(InMemoryMessageStore::default()));

    let events = collect(&service, RunRequest::new("What is 2+2?", "u1")).await;

    let names = names(&events);
    assert_eq!(names[..5], ["new_conversation", "init_node", "tool_call_start", "tool_call_response", "tool_call_end"]);
    assert_eq!(names.last(), Some(&"done"));
    assert_eq!(names.iter().filter(|n| **n == "done" || **n == "error").count(), 1);

    let answer: String = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::FinalResponse { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert!(answer.contains('4'));
    assert!(events.iter().any(|e| matches!(
        e,
        ChatEvent::ToolCallResponse { response, .. } if response.content == "4"
    )));

    let doc = TurnDocument::from_events(&events);
    assert_eq!(doc.status, TurnStatus::Completed);
    assert_eq!(doc.content, answer);
    assert_eq!(doc.saved, Some(true));
    assert_eq!(doc.usage.total_tokens, 60);
}

#[tokio::test]
async fn self_discussion_is_bracketed_before_the_answer() {
    let provider = MockProvider::new(vec![
        text("The user wants a quick sum; no tool needed."),
        text("It is 4."),
    ]);
    let service = service(provider, Arc::new(InMemoryMessageStore::default()));

    let events = collect(
        &service,
        RunRequest::new("What is 2+2?", "u1").with_self_discussion(true),
    )
    .await;

    let names = names(&events);
    assert_eq!(names.iter().filter(|n| **n == "self_discussion_start").count(), 1);
    assert_eq!(names.iter().filter(|n| **n == "self_discussion_end").count(), 1);
    assert!(names.iter().filter(|n| **n == "delta").count() >= 1);

    let start = position(&events, "self_discussion_start");
    let end = position(&events, "self_discussion_end");
    let first_answer = position(&events, "final_response");
    assert!(start < end && end < first_answer);
    assert!(events[start..end].iter().all(|e| e.name() != "final_response"));

    let doc = TurnDocument::from_events(&events);
    assert_eq!(doc.sources.self_discussion_context, "The user wants a quick sum; no tool needed.");
    assert_eq!(doc.content, "It is 4.");
}

#[tokio::test]
async fn existing_session_skips_new_conversation() {
    let provider = MockProvider::new(vec![text("hello again")]);
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::default());
    let service = service(provider, store.clone());

    let events = collect(&service, RunRequest::new("hi", "u1").with_session("s1")).await;

    assert_eq!(events[0].name(), "init_node");
    assert!(matches!(
        events.last(),
        Some(ChatEvent::Done { conversation_id, saved: true, .. }) if conversation_id == "s1"
    ));
    assert_eq!(stored(store, "u1", "s1").await.len(), 2);
}

#[tokio::test]
async fn unsaved_response_is_still_delivered() {
    let provider = MockProvider::new(vec![text("4")]);
    let service = service(provider, Arc::new(FailingStore::default()));

    let events = collect(&service, RunRequest::new("What is 2+2?", "u1")).await;

    assert!(events.iter().any(|e| matches!(e, ChatEvent::FinalResponse { text, .. } if text == "4")));
    assert!(matches!(events.last(), Some(ChatEvent::Done { saved: false, .. })));
}

#[tokio::test]
async fn model_failure_ends_with_a_single_error() {
    let provider = MockProvider::new(vec![
        Reply::ToolCalls(vec![call("c1", "echo", json!({"text": "x"}))]),
        Reply::Fail("overloaded".into()),
    ]);
    let service = service(provider, Arc::new(InMemoryMessageStore::default()));

    let events = collect(&service, RunRequest::new("hi", "u1")).await;

    let names = names(&events);
    assert_eq!(names.last(), Some(&"error"));
    assert!(!names.contains(&"done"));
    // The tool bracket is closed before the error.
    assert_eq!(names[names.len() - 2], "tool_call_end");
    assert!(matches!(
        events.last(),
        Some(ChatEvent::Error { fault: Some(FaultClass::ModelFault), .. })
    ));
    assert_eq!(TurnDocument::from_events(&events).status, TurnStatus::Failed);
}

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let provider = MockProvider::new(vec![]);
    let service = service(provider.clone(), Arc::new(InMemoryMessageStore::default()));

    let events = collect(&service, RunRequest::new("   ", "u1").with_session("s1")).await;

    assert_eq!(names(&events), ["init_node", "error"]);
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn finished_exchange_is_indexed_for_retrieval() {
    let provider = MockProvider::new(vec![text("Paris is the capital of France.")]);
    let engine = engine(provider, Arc::new(InMemoryMessageStore::default()), true).with_settings(
        WorkflowSettings::builder().index_exchanges(true).build(),
    );
    let vectors = Arc::new(InMemoryVectorStore::new(
        "exchanges",
        Arc::new(HashingEmbedder::new(64)),
        64,
    ));
    let service = ChatService::new(engine).with_vector_store(vectors.clone());

    let events = collect(
        &service,
        RunRequest::new("What is the capital of France?", "u1").with_session("s1"),
    )
    .await;
    assert_eq!(events.last().map(ChatEvent::name), Some("done"));

    assert_eq!(vectors.len().await, 1);
    let hits = vectors.similarity_search("capital of France", 1).await.unwrap();
    assert!(hits[0].text.contains("Chatbot Response: Paris is the capital of France."));
    assert_eq!(hits[0].metadata["conversation_id"], "s1");
}

fn tool_responses(events: &[ChatEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::ToolCallResponse { response, .. } => Some(response.content.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn per_user_index_outlives_the_run_that_wrote_it() {
    let provider = MockProvider::new(vec![
        text("Noted, your cat is called Tom."),
        Reply::ToolCalls(vec![call("call_1", "vector_db", json!({"query": "cat name", "k": 3}))]),
        text("Your cat is Tom."),
        Reply::ToolCalls(vec![call("call_2", "vector_db", json!({"query": "cat name"}))]),
        text("I don't know yet."),
    ]);
    let engine = engine(provider, Arc::new(InMemoryMessageStore::default()), true)
        .with_registry(ToolRegistry::new().with(vector_db_tool()))
        .with_settings(WorkflowSettings::builder().index_exchanges(true).build());
    let service = ChatService::new(engine).with_per_user_vector_stores(BujjiConfig::new());

    let first = collect(&service, RunRequest::new("My cat is called Tom.", "alice")).await;
    assert_eq!(first.last().map(ChatEvent::name), Some("done"));

    let second = collect(&service, RunRequest::new("What is my cat called?", "alice")).await;
    let found = tool_responses(&second);
    assert_eq!(found.len(), 1);
    assert!(found[0].starts_with("Chunk 1\nUser Query: My cat is called Tom."));
    assert!(found[0].contains("Chatbot Response: Noted, your cat is called Tom."));

    let other_user = collect(&service, RunRequest::new("What is my cat called?", "bob")).await;
    assert_eq!(tool_responses(&other_user), [""]);
}

/// A vector store whose writes never complete.
struct StalledStore;

#[async_trait]
impl VectorStore for StalledStore {
    fn backend_name(&self) -> &str {
        "stalled"
    }

    async fn add_documents(&self, _entries: Vec<VectorEntry>) -> Result<Vec<String>, BujjiError> {
        futures::future::pending().await
    }

    async fn similarity_search(&self, _text: &str, _k: usize) -> Result<Vec<ScoredChunk>, BujjiError> {
        Ok(Vec::new())
    }

    async fn delete_index(&self) -> Result<(), BujjiError> {
        Ok(())
    }

    async fn delete_vectors(&self, _selector: VectorSelector) -> Result<(), BujjiError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_indexing_still_ends_with_done() {
    let provider = MockProvider::new(vec![text("Hello!")]);
    let engine = engine(provider, Arc::new(InMemoryMessageStore::default()), true)
        .with_settings(WorkflowSettings::builder().index_exchanges(true).build());
    let service = ChatService::new(engine).with_vector_store(Arc::new(StalledStore));

    let events = collect(&service, RunRequest::new("Hi", "u1")).await;
    assert_eq!(events.last().map(ChatEvent::name), Some("done"));
    assert_eq!(TurnDocument::from_events(&events).content, "Hello!");
}
