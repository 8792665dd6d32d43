//! Shared test helpers: a scripted model provider, tools and stores.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;

use bujji::error::BujjiError;
use bujji::memory::{InMemoryMessageStore, Memory, MessageStore, SessionKey};
use bujji::provider::{
    ModelProvider, ProviderRequest, ProviderResponse, StaticModelResolver, ToolDefinition,
};
use bujji::tools::{AgentTool, AgentToolParameters, Tool, ToolRegistry};
use bujji::types::*;
use bujji::workflow::WorkflowEngine;

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
    Fail(String),
}

pub fn text(reply: &str) -> Reply {
    Reply::Text(reply.to_string())
}

pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

/// A provider that plays back queued replies and records every request.
pub struct MockProvider {
    model_id: String,
    replies: Mutex<Vec<Reply>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockProvider {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            model_id: "mock-model".to_string(),
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn tool_names_offered(&self) -> Vec<Vec<String>> {
        self.requests()
            .iter()
            .map(|r| {
                r.tools
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(|t: &ToolDefinition| t.name.clone())
                    .collect()
            })
            .collect()
    }

    fn next(&self, request: &ProviderRequest) -> Reply {
        self.requests.lock().unwrap().push(request.clone());
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            Reply::Text("Mock response".to_string())
        } else {
            replies.remove(0)
        }
    }
}

fn usage() -> Usage {
    Usage {
        input_tokens: 10,
        output_tokens: 20,
        total_tokens: 30,
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_text(&self, request: &ProviderRequest) -> Result<ProviderResponse, BujjiError> {
        match self.next(request) {
            Reply::Text(text) => Ok(ProviderResponse {
                text,
                usage: usage(),
                tool_calls: vec![],
                finish_reason: Some(FinishReason::Stop),
            }),
            Reply::ToolCalls(tool_calls) => Ok(ProviderResponse {
                text: String::new(),
                usage: usage(),
                tool_calls,
                finish_reason: Some(FinishReason::ToolCalls),
            }),
            Reply::Fail(message) => Err(BujjiError::api(500, message)),
        }
    }

    async fn stream_text(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<TextStreamDelta, BujjiError>>, BujjiError> {
        let reply = self.next(request);
        if let Reply::Fail(message) = &reply {
            return Err(BujjiError::api(500, message.clone()));
        }
        let stream = async_stream::stream! {
            match reply {
                Reply::Text(text) => {
                    for chunk in text.chars().collect::<Vec<_>>().chunks(5) {
                        yield Ok(TextStreamDelta::text(chunk.iter().collect::<String>()));
                    }
                    yield Ok(TextStreamDelta::done(Some(FinishReason::Stop), Some(usage())));
                }
                Reply::ToolCalls(calls) => {
                    for (index, call) in calls.into_iter().enumerate() {
                        yield Ok(TextStreamDelta::tool_call(ToolCallChunk {
                            index,
                            id: Some(call.id),
                            name: Some(call.name),
                            arguments: call.arguments.to_string(),
                        }));
                    }
                    yield Ok(TextStreamDelta::done(Some(FinishReason::ToolCalls), Some(usage())));
                }
                Reply::Fail(_) => {}
            }
        };
        Ok(Box::pin(stream))
    }
}

/// A tool that always fails and counts its attempts.
pub fn failing_tool(name: &str, attempts: Arc<AtomicU32>) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        name,
        "Always fails",
        AgentToolParameters::empty(),
        move |_args, _ctx| {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(BujjiError::tool("flaky", "upstream unavailable"))
            }
        },
    ))
}

/// A tool that echoes its `text` argument.
pub fn echo_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "echo",
        "Echo the given text",
        AgentToolParameters::object()
            .string("text", "Text to echo", true)
            .build(),
        |args, _ctx| async move { Ok(serde_json::json!(args.get_str("text")?)) },
    ))
}

/// A message store whose appends always fail.
#[derive(Default)]
pub struct FailingStore {
    inner: InMemoryMessageStore,
}

#[async_trait]
impl MessageStore for FailingStore {
    async fn append(&self, _session: &SessionKey, _message: &Message) -> Result<(), BujjiError> {
        Err(BujjiError::Storage("disk full".into()))
    }

    async fn messages(&self, session: &SessionKey) -> Result<Vec<Message>, BujjiError> {
        self.inner.messages(session).await
    }

    async fn clear(&self, session: &SessionKey) -> Result<(), BujjiError> {
        self.inner.clear(session).await
    }
}

/// Engine over a mock provider and the given store, with calculator and
/// echo tools and buffered (non-streamed) model output unless `stream`.
pub fn engine(
    provider: Arc<MockProvider>,
    store: Arc<dyn MessageStore>,
    stream: bool,
) -> WorkflowEngine {
    let registry = ToolRegistry::new()
        .with(bujji::tools::builtin::calculator_tool())
        .with(echo_tool());
    let settings = bujji::config::WorkflowSettings::builder()
        .stream_model_output(stream)
        .index_exchanges(false)
        .build();
    WorkflowEngine::new(Arc::new(StaticModelResolver::new(provider)), store)
        .with_registry(registry)
        .with_settings(settings)
}

pub async fn stored(store: Arc<dyn MessageStore>, user: &str, session: &str) -> Vec<Message> {
    Memory::new(store, SessionKey::new(user, session))
        .history()
        .await
        .unwrap()
}
