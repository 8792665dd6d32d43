//! Groq provider (OpenAI-compatible).

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::BujjiError;
use crate::types::TextStreamDelta;

use super::openai::OpenAiProvider;
use super::{ModelProvider, ProviderRequest, ProviderResponse};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

pub struct GroqProvider {
    inner: OpenAiProvider,
}

impl GroqProvider {
    pub fn new(model_id: String, api_key: String, base_url: Option<String>) -> Self {
        Self {
            inner: OpenAiProvider::named(
                "groq",
                model_id,
                api_key,
                Some(base_url.unwrap_or_else(|| GROQ_BASE_URL.to_string())),
            ),
        }
    }
}

#[async_trait]
impl ModelProvider for GroqProvider {
    fn provider_name(&self) -> &str { "groq" }
    fn model_id(&self) -> &str { self.inner.model_id() }
    async fn generate_text(&self, request: &ProviderRequest) -> Result<ProviderResponse, BujjiError> {
        self.inner.generate_text(request).await
    }
    async fn stream_text(&self, request: &ProviderRequest) -> Result<BoxStream<'static, Result<TextStreamDelta, BujjiError>>, BujjiError> {
        self.inner.stream_text(request).await
    }
}
