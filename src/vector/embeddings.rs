//! Text embedders.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::{BujjiConfig, EmbedderConfig, DEFAULT_EMBEDDING_DIMENSION};
use crate::error::{BujjiError, Result};
use crate::provider::http::{bearer_headers, error_from_response, shared_client};

pub const COHERE_BASE_URL: &str = "https://api.cohere.com";

/// Cohere accepts at most this many texts per request.
const COHERE_BATCH: usize = 96;

/// Whether a text is being indexed or used as a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InputType {
    #[serde(rename = "search_document")]
    Document,
    #[serde(rename = "search_query")]
    Query,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()], InputType::Query)
            .await?
            .pop()
            .ok_or_else(|| BujjiError::vector("embedder", "empty embedding response"))
    }
}

/// Build the configured embedder at the configured dimensionality.
pub fn build_embedder(config: &BujjiConfig) -> Result<Arc<dyn Embedder>> {
    Ok(match &config.embedder {
        EmbedderConfig::Cohere { model } => {
            let api_key = config.require_api_key("cohere")?;
            let mut embedder = CohereEmbedder::new(api_key).with_model(model.clone());
            if let Some(url) = config.get_base_url("cohere") {
                embedder = embedder.with_base_url(url);
            }
            Arc::new(embedder)
        }
        EmbedderConfig::Hashing => Arc::new(HashingEmbedder::new(config.vector.dimension())),
    })
}

/// Cohere `/v1/embed` client.
#[derive(Debug, Clone)]
pub struct CohereEmbedder {
    api_key: String,
    model: String,
    base_url: String,
    dimension: usize,
}

#[derive(Serialize)]
struct CohereEmbedRequest<'a> {
    model: &'a str,
    texts: &'a [String],
    input_type: InputType,
    truncate: &'static str,
}

#[derive(Deserialize)]
struct CohereEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl CohereEmbedder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "embed-english-v3.0".to_string(),
            base_url: COHERE_BASE_URL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

#[async_trait]
impl Embedder for CohereEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(COHERE_BATCH) {
            debug!(model = %self.model, texts = batch.len(), "cohere embed");
            let resp = shared_client()
                .post(format!("{}/v1/embed", self.base_url.trim_end_matches('/')))
                .headers(bearer_headers(&self.api_key))
                .json(&CohereEmbedRequest {
                    model: &self.model,
                    texts: batch,
                    input_type,
                    truncate: "END",
                })
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(error_from_response(resp).await);
            }
            let body: CohereEmbedResponse = resp.json().await?;
            if body.embeddings.len() != batch.len() {
                return Err(BujjiError::vector(
                    "cohere",
                    format!("expected {} embeddings, got {}", batch.len(), body.embeddings.len()),
                ));
            }
            out.extend(body.embeddings);
        }
        Ok(out)
    }
}

/// Deterministic local embedder: signed feature hashing of lowercased
/// words and word bigrams, L2-normalized. Needs no network and makes texts
/// that share vocabulary land close together.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut add = |feature: &str, weight: f32| {
            let digest = Sha256::digest(feature.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let slot = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign * weight;
        };
        for word in &words {
            add(word.as_str(), 1.0);
        }
        for pair in words.windows(2) {
            add(&format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String], _input_type: InputType) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
