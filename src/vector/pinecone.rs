//! Pinecone serverless backend over its REST API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::embeddings::{Embedder, InputType};
use super::{Metadata, ScoredChunk, VectorEntry, VectorSelector, VectorStore};
use crate::config::DEFAULT_EMBEDDING_DIMENSION;
use crate::error::{BujjiError, Result};
use crate::provider::http::{api_key_headers, error_from_response, shared_client};

pub const PINECONE_CONTROL_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";
const BACKEND: &str = "pinecone";

/// Metadata key holding the chunk text.
const TEXT_KEY: &str = "text";

/// One Pinecone index. The index is created on first use and writes wait
/// until its status reports ready; data-plane calls go to the index host.
pub struct PineconeVectorStore {
    control_url: String,
    api_key: String,
    index: String,
    cloud: String,
    region: String,
    dimension: usize,
    embedder: Arc<dyn Embedder>,
    host: Mutex<Option<String>>,
    poll_interval: Duration,
    max_polls: u32,
}

impl std::fmt::Debug for PineconeVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeVectorStore")
            .field("index", &self.index)
            .field("cloud", &self.cloud)
            .field("region", &self.region)
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[derive(Deserialize)]
struct IndexDescription {
    #[serde(default)]
    host: String,
    status: IndexStatus,
}

#[derive(Deserialize)]
struct IndexStatus {
    ready: bool,
    #[serde(default)]
    state: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Deserialize)]
struct PineconeMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Metadata,
}

impl PineconeVectorStore {
    pub fn new(api_key: impl Into<String>, index: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            control_url: PINECONE_CONTROL_URL.to_string(),
            api_key: api_key.into(),
            index: index.into(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            embedder,
            host: Mutex::new(None),
            poll_interval: Duration::from_secs(1),
            max_polls: 120,
        }
    }

    pub fn with_serverless(mut self, cloud: impl Into<String>, region: impl Into<String>) -> Self {
        self.cloud = cloud.into();
        self.region = region.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_control_url(mut self, url: impl Into<String>) -> Self {
        self.control_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_readiness_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let mut headers = api_key_headers("api-key", Some(&self.api_key));
        headers.insert("x-pinecone-api-version", HeaderValue::from_static(API_VERSION));
        shared_client().request(method, url).headers(headers)
    }

    async fn describe(&self) -> Result<Option<IndexDescription>> {
        let resp = self
            .request(reqwest::Method::GET, format!("{}/indexes/{}", self.control_url, self.index))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(into_vector_error(error_from_response(resp).await));
        }
        Ok(Some(resp.json().await?))
    }

    /// Resolve the data-plane host, creating the index and waiting for
    /// readiness on first use.
    async fn ensure_index(&self) -> Result<String> {
        let mut host = self.host.lock().await;
        if let Some(host) = host.as_ref() {
            return Ok(host.clone());
        }

        if self.describe().await?.is_none() {
            info!(index = %self.index, dimension = self.dimension, "creating pinecone index");
            let resp = self
                .request(reqwest::Method::POST, format!("{}/indexes", self.control_url))
                .json(&json!({
                    "name": self.index,
                    "dimension": self.dimension,
                    "metric": "cosine",
                    "spec": { "serverless": { "cloud": self.cloud, "region": self.region } }
                }))
                .send()
                .await?;
            // 409: created concurrently by someone else.
            if !resp.status().is_success() && resp.status() != reqwest::StatusCode::CONFLICT {
                return Err(into_vector_error(error_from_response(resp).await));
            }
        }

        for poll in 0..self.max_polls {
            if let Some(desc) = self.describe().await? {
                if desc.status.ready && !desc.host.is_empty() {
                    let resolved = if desc.host.starts_with("http") {
                        desc.host
                    } else {
                        format!("https://{}", desc.host)
                    };
                    *host = Some(resolved.clone());
                    return Ok(resolved);
                }
                debug!(index = %self.index, state = %desc.status.state, poll, "waiting for pinecone index");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(BujjiError::vector(BACKEND, format!("index {} did not become ready", self.index)))
    }

    async fn data_call(&self, path: &str, body: Value) -> Result<Value> {
        let host = self.ensure_index().await?;
        let resp = self
            .request(reqwest::Method::POST, format!("{}{}", host.trim_end_matches('/'), path))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(into_vector_error(error_from_response(resp).await));
        }
        Ok(resp.json().await.unwrap_or(Value::Null))
    }
}

fn into_vector_error(err: BujjiError) -> BujjiError {
    match err {
        BujjiError::Api { status, message, .. } => {
            BujjiError::vector(BACKEND, format!("HTTP {status}: {message}"))
        }
        other => other,
    }
}

fn filter_clause(filter: &Metadata) -> Value {
    Value::Object(
        filter
            .iter()
            .map(|(key, value)| (key.clone(), json!({ "$eq": value })))
            .collect(),
    )
}

#[async_trait]
impl VectorStore for PineconeVectorStore {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    async fn add_documents(&self, entries: Vec<VectorEntry>) -> Result<Vec<String>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        let vectors = self.embedder.embed(&texts, InputType::Document).await?;
        let records: Vec<Value> = entries
            .iter()
            .zip(vectors)
            .map(|(entry, values)| {
                let mut metadata = entry.metadata.clone();
                metadata.insert(TEXT_KEY.into(), Value::String(entry.text.clone()));
                json!({ "id": entry.id, "values": values, "metadata": metadata })
            })
            .collect();
        self.data_call("/vectors/upsert", json!({ "vectors": records })).await?;
        debug!(index = %self.index, added = entries.len(), "upserted pinecone vectors");
        Ok(entries.into_iter().map(|e| e.id).collect())
    }

    async fn similarity_search(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let vector = self.embedder.embed_query(text).await?;
        let raw = self
            .data_call(
                "/query",
                json!({ "vector": vector, "topK": k, "includeMetadata": true }),
            )
            .await?;
        let response: QueryResponse = serde_json::from_value(raw)?;
        Ok(response
            .matches
            .into_iter()
            .map(|mut m| {
                let text = match m.metadata.remove(TEXT_KEY) {
                    Some(Value::String(text)) => text,
                    _ => String::new(),
                };
                ScoredChunk {
                    id: m.id,
                    text,
                    score: m.score,
                    metadata: m.metadata,
                }
            })
            .collect())
    }

    async fn delete_index(&self) -> Result<()> {
        let mut host = self.host.lock().await;
        let resp = self
            .request(reqwest::Method::DELETE, format!("{}/indexes/{}", self.control_url, self.index))
            .send()
            .await?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(into_vector_error(error_from_response(resp).await));
        }
        *host = None;
        info!(index = %self.index, "deleted pinecone index");
        Ok(())
    }

    async fn delete_vectors(&self, selector: VectorSelector) -> Result<()> {
        let body = match &selector {
            VectorSelector::Ids(ids) => json!({ "ids": ids }),
            VectorSelector::Filter(filter) => json!({ "filter": filter_clause(filter) }),
        };
        self.data_call("/vectors/delete", body).await?;
        Ok(())
    }
}
