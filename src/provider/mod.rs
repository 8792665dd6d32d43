//! Model provider trait and implementations.

pub mod bound;
pub mod format;
pub mod http;
pub mod sanitize;

#[cfg(feature = "groq")]
pub mod groq;
#[cfg(any(feature = "openai", feature = "groq"))]
pub mod openai;

pub use bound::{BoundModel, StreamAccumulator};
pub use sanitize::sanitize_transcript;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use strum::{Display, EnumString};

use crate::config::BujjiConfig;
use crate::error::BujjiError;
use crate::types::{FinishReason, GenerationSettings, Message, TextStreamDelta, ToolCallRequest, Usage};

/// A request sent to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub messages: Vec<Message>,
    pub settings: GenerationSettings,
    pub tools: Option<Vec<ToolDefinition>>,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Response from a provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub text: String,
    pub usage: Usage,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: Option<FinishReason>,
}

/// Core trait implemented by all model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "groq", "openai").
    fn provider_name(&self) -> &str;
    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// Generate text (non-streaming).
    async fn generate_text(&self, request: &ProviderRequest)
        -> Result<ProviderResponse, BujjiError>;

    /// Generate text (streaming).
    async fn stream_text(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<TextStreamDelta, BujjiError>>, BujjiError>;
}

/// Providers reachable through a `provider:model` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    Groq,
    #[strum(serialize = "openai")]
    OpenAi,
}

/// A parsed model name. Bare names are served by Groq.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model_id: String,
}

impl ModelSpec {
    pub fn parse(name: &str) -> Result<Self, BujjiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BujjiError::ModelNotFound("empty model name".into()));
        }
        if let Some((prefix, model_id)) = name.split_once(':') {
            if let Ok(provider) = prefix.parse::<ProviderKind>() {
                if model_id.is_empty() {
                    return Err(BujjiError::ModelNotFound(name.to_string()));
                }
                return Ok(Self {
                    provider,
                    model_id: model_id.to_string(),
                });
            }
        }
        Ok(Self {
            provider: ProviderKind::Groq,
            model_id: name.to_string(),
        })
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model_id)
    }
}

/// Create a provider for the given model name, using the provided config.
#[allow(unused_variables)]
pub fn create_provider(
    model_name: &str,
    config: &BujjiConfig,
) -> Result<Arc<dyn ModelProvider>, BujjiError> {
    let spec = ModelSpec::parse(model_name)?;
    match spec.provider {
        #[cfg(feature = "groq")]
        ProviderKind::Groq => {
            let api_key = config
                .get_api_key("groq")
                .ok_or_else(|| BujjiError::Authentication("Missing GROQ_API_KEY".into()))?;
            Ok(Arc::new(groq::GroqProvider::new(
                spec.model_id,
                api_key,
                config.get_base_url("groq"),
            )))
        }
        #[cfg(feature = "openai")]
        ProviderKind::OpenAi => {
            let api_key = config
                .get_api_key("openai")
                .ok_or_else(|| BujjiError::Authentication("Missing OPENAI_API_KEY".into()))?;
            Ok(Arc::new(openai::OpenAiProvider::new(
                spec.model_id,
                api_key,
                config.get_base_url("openai"),
            )))
        }
        #[allow(unreachable_patterns)]
        _ => Err(BujjiError::ModelNotFound(format!(
            "Provider for model '{spec}' not enabled via feature flags"
        ))),
    }
}

/// Turns a model name into a provider handle for one run.
pub trait ModelResolver: Send + Sync {
    fn resolve(&self, model_name: &str) -> Result<Arc<dyn ModelProvider>, BujjiError>;
}

/// Resolver backed by configured credentials.
#[derive(Debug, Clone)]
pub struct ConfigModelResolver {
    config: BujjiConfig,
}

impl ConfigModelResolver {
    pub fn new(config: BujjiConfig) -> Self {
        Self { config }
    }
}

impl ModelResolver for ConfigModelResolver {
    fn resolve(&self, model_name: &str) -> Result<Arc<dyn ModelProvider>, BujjiError> {
        create_provider(model_name, &self.config)
    }
}

/// Always hands out the same provider, whatever the model name.
pub struct StaticModelResolver {
    provider: Arc<dyn ModelProvider>,
}

impl StaticModelResolver {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }
}

impl ModelResolver for StaticModelResolver {
    fn resolve(&self, _model_name: &str) -> Result<Arc<dyn ModelProvider>, BujjiError> {
        Ok(self.provider.clone())
    }
}
