//! Qdrant backend over its REST API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::embeddings::{Embedder, InputType};
use super::{Metadata, ScoredChunk, VectorEntry, VectorSelector, VectorStore};
use crate::config::DEFAULT_EMBEDDING_DIMENSION;
use crate::error::{BujjiError, Result};
use crate::provider::http::{api_key_headers, error_from_response, shared_client};

const BACKEND: &str = "qdrant";

/// One Qdrant collection. Created on first use; every write waits for the
/// collection to report `green`.
pub struct QdrantVectorStore {
    base_url: String,
    api_key: Option<String>,
    collection: String,
    dimension: usize,
    embedder: Arc<dyn Embedder>,
    ready: Mutex<bool>,
    poll_interval: Duration,
    max_polls: u32,
}

impl std::fmt::Debug for QdrantVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantVectorStore")
            .field("base_url", &self.base_url)
            .field("collection", &self.collection)
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[derive(Deserialize)]
struct QdrantEnvelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Deserialize)]
struct CollectionInfo {
    status: String,
}

#[derive(Deserialize)]
struct QdrantHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Metadata,
}

impl QdrantVectorStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            collection: collection.into(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            embedder,
            ready: Mutex::new(false),
            poll_interval: Duration::from_secs(1),
            max_polls: 60,
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_readiness_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        shared_client()
            .request(method, url)
            .headers(api_key_headers("api-key", self.api_key.as_deref()))
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(into_vector_error(error_from_response(resp).await));
        }
        let envelope: QdrantEnvelope<T> = resp.json().await?;
        Ok(envelope.result)
    }

    /// Create the collection if missing and wait until it is green.
    async fn ensure_collection(&self) -> Result<()> {
        let mut ready = self.ready.lock().await;
        if *ready {
            return Ok(());
        }

        let exists: ExistsResult = self
            .send(self.request(reqwest::Method::GET, self.url("/exists")))
            .await?;
        if !exists.exists {
            info!(collection = %self.collection, dimension = self.dimension, "creating qdrant collection");
            let _: Value = self
                .send(self.request(reqwest::Method::PUT, self.url("")).json(&json!({
                    "vectors": { "size": self.dimension, "distance": "Cosine" }
                })))
                .await?;
        }

        for poll in 0..self.max_polls {
            let info: CollectionInfo = self
                .send(self.request(reqwest::Method::GET, self.url("")))
                .await?;
            if info.status == "green" {
                *ready = true;
                return Ok(());
            }
            debug!(collection = %self.collection, status = %info.status, poll, "waiting for qdrant collection");
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(BujjiError::vector(
            BACKEND,
            format!("collection {} did not become ready", self.collection),
        ))
    }
}

/// Qdrant point ids must be UUIDs or integers; other caller ids map to a
/// stable UUID derived from their hash.
fn point_id(id: &str) -> String {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return uuid.to_string();
    }
    let digest = Sha256::digest(id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
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
    let must: Vec<Value> = filter
        .iter()
        .map(|(key, value)| json!({ "key": format!("metadata.{key}"), "match": { "value": value } }))
        .collect();
    json!({ "must": must })
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    async fn add_documents(&self, entries: Vec<VectorEntry>) -> Result<Vec<String>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_collection().await?;
        let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        let vectors = self.embedder.embed(&texts, InputType::Document).await?;

        let points: Vec<Value> = entries
            .iter()
            .zip(vectors)
            .map(|(entry, vector)| {
                json!({
                    "id": point_id(&entry.id),
                    "vector": vector,
                    "payload": {
                        "entry_id": entry.id,
                        "page_content": entry.text,
                        "metadata": entry.metadata,
                    }
                })
            })
            .collect();
        let _: Value = self
            .send(
                self.request(reqwest::Method::PUT, self.url("/points?wait=true"))
                    .json(&json!({ "points": points })),
            )
            .await?;
        debug!(collection = %self.collection, added = entries.len(), "upserted qdrant points");
        Ok(entries.into_iter().map(|e| e.id).collect())
    }

    async fn similarity_search(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        self.ensure_collection().await?;
        let vector = self.embedder.embed_query(text).await?;
        let hits: Vec<QdrantHit> = self
            .send(
                self.request(reqwest::Method::POST, self.url("/points/search"))
                    .json(&json!({ "vector": vector, "limit": k, "with_payload": true })),
            )
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let id = hit
                    .payload
                    .get("entry_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| match &hit.id {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                ScoredChunk {
                    id,
                    text: hit
                        .payload
                        .get("page_content")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    score: hit.score,
                    metadata: hit
                        .payload
                        .get("metadata")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn delete_index(&self) -> Result<()> {
        let mut ready = self.ready.lock().await;
        let _: Value = self
            .send(self.request(reqwest::Method::DELETE, self.url("")))
            .await?;
        *ready = false;
        info!(collection = %self.collection, "deleted qdrant collection");
        Ok(())
    }

    async fn delete_vectors(&self, selector: VectorSelector) -> Result<()> {
        self.ensure_collection().await?;
        let body = match &selector {
            VectorSelector::Ids(ids) => {
                json!({ "points": ids.iter().map(|id| point_id(id)).collect::<Vec<_>>() })
            }
            VectorSelector::Filter(filter) => json!({ "filter": filter_clause(filter) }),
        };
        let _: Value = self
            .send(
                self.request(reqwest::Method::POST, self.url("/points/delete?wait=true"))
                    .json(&body),
            )
            .await?;
        Ok(())
    }
}
