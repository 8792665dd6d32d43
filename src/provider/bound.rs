//! A provider bound to a tool set, plus stream accumulation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::debug;

use crate::error::BujjiError;
use crate::types::{
    FinishReason, GenerationSettings, Message, StreamEventType, TextStreamDelta, ToolCallChunk,
    ToolCallRequest, Usage,
};
use crate::util::timeout::with_timeout;

use super::format::parse_tool_arguments;
use super::{sanitize_transcript, ModelProvider, ProviderRequest, ToolDefinition};

const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);

/// Model handle with tools attached, as carried in workflow state.
#[derive(Clone)]
pub struct BoundModel {
    provider: Arc<dyn ModelProvider>,
    tools: Vec<ToolDefinition>,
    settings: GenerationSettings,
    timeout: Duration,
}

impl std::fmt::Debug for BoundModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundModel")
            .field("provider", &self.provider.provider_name())
            .field("model", &self.provider.model_id())
            .field("tools", &self.tools.iter().map(|t| &t.name).collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl BoundModel {
    pub fn new(provider: Arc<dyn ModelProvider>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            provider,
            tools,
            settings: GenerationSettings::default(),
            timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Same model with no tools attached.
    pub fn without_tools(&self) -> Self {
        Self {
            tools: Vec::new(),
            ..self.clone()
        }
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// `provider:model` label recorded on AI messages.
    pub fn label(&self) -> String {
        format!("{}:{}", self.provider.provider_name(), self.provider.model_id())
    }

    fn request(&self, messages: &[Message]) -> ProviderRequest {
        ProviderRequest {
            messages: sanitize_transcript(messages),
            settings: self.settings.clone(),
            tools: (!self.tools.is_empty()).then(|| self.tools.clone()),
        }
    }

    /// One non-streaming call returning the AI message.
    pub async fn invoke(&self, messages: &[Message]) -> Result<Message, BujjiError> {
        let request = self.request(messages);
        debug!(model = %self.label(), messages = request.messages.len(), tools = self.tools.len(), "invoke");
        let response = with_timeout(self.timeout, self.provider.generate_text(&request)).await?;

        let mut message = Message::ai_with_tool_calls(response.text, response.tool_calls)
            .with_usage(response.usage)
            .with_model(self.label());
        message.finish_reason = response.finish_reason;
        Ok(message)
    }

    /// Streaming call. `on_text` sees every non-empty text fragment as it
    /// arrives; the assembled AI message is returned at the end. The
    /// timeout covers the whole exchange.
    pub async fn stream_with<F>(&self, messages: &[Message], mut on_text: F) -> Result<Message, BujjiError>
    where
        F: FnMut(&str) + Send,
    {
        let request = self.request(messages);
        debug!(model = %self.label(), messages = request.messages.len(), tools = self.tools.len(), "stream");

        let provider = self.provider.clone();
        let label = self.label();
        with_timeout(self.timeout, async move {
            let mut stream = provider.stream_text(&request).await?;
            let mut acc = StreamAccumulator::default();
            while let Some(delta) = stream.next().await {
                let delta = delta?;
                if delta.event_type == StreamEventType::TextDelta && !delta.text.is_empty() {
                    on_text(&delta.text);
                }
                let done = delta.event_type == StreamEventType::Done;
                acc.push(delta);
                if done {
                    break;
                }
            }
            Ok(acc.finish().with_model(label))
        })
        .await
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Folds stream deltas into one AI message.
///
/// Tool-call fragments are grouped by index; the first fragment of a call
/// normally carries its id and name, later ones append argument text.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    calls: BTreeMap<usize, PartialToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl StreamAccumulator {
    pub fn push(&mut self, delta: TextStreamDelta) {
        match delta.event_type {
            StreamEventType::TextDelta => self.text.push_str(&delta.text),
            StreamEventType::ToolCallDelta => {
                if let Some(chunk) = delta.tool_call {
                    self.push_tool_chunk(chunk);
                }
            }
            StreamEventType::Done => {}
        }
        if delta.finish_reason.is_some() {
            self.finish_reason = delta.finish_reason;
        }
        if let Some(usage) = delta.usage {
            self.usage = Some(usage);
        }
    }

    fn push_tool_chunk(&mut self, chunk: ToolCallChunk) {
        let entry = self.calls.entry(chunk.index).or_default();
        if let Some(id) = chunk.id.filter(|id| !id.is_empty()) {
            entry.id = Some(id);
        }
        if let Some(name) = chunk.name {
            entry.name.push_str(&name);
        }
        entry.arguments.push_str(&chunk.arguments);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn finish(self) -> Message {
        let tool_calls: Vec<ToolCallRequest> = self
            .calls
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| ToolCallRequest {
                id: call
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                name: call.name,
                arguments: parse_tool_arguments(&call.arguments),
            })
            .collect();

        let finish_reason = match self.finish_reason {
            Some(reason) => Some(reason),
            None if !tool_calls.is_empty() => Some(FinishReason::ToolCalls),
            None => Some(FinishReason::Stop),
        };

        let mut message = Message::ai_with_tool_calls(self.text, tool_calls);
        message.finish_reason = finish_reason;
        message.usage = self.usage;
        message
    }
}
