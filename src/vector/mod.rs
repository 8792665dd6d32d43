//! Vector store capability and its backends.
//!
//! Every backend honors the same contract:
//!
//! - ids supplied by the caller are upserted, so adding the same id twice
//!   replaces the entry instead of duplicating it;
//! - the backing index or collection is created on first use with the
//!   configured dimensionality, and writes wait until it reports ready;
//! - `query` caps `k` at [`MAX_QUERY_K`] and labels hits `Chunk 1`, `Chunk 2`, ...

pub mod embeddings;
pub mod memory;
#[cfg(feature = "pinecone")]
pub mod pinecone;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod splitter;

pub use embeddings::{build_embedder, CohereEmbedder, Embedder, HashingEmbedder, InputType};
pub use memory::InMemoryVectorStore;
#[cfg(feature = "pinecone")]
pub use pinecone::PineconeVectorStore;
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
pub use splitter::split_text;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::{BujjiConfig, VectorBackendConfig};
use crate::error::{BujjiError, Result};

/// Upper bound on hits returned by one query.
pub const MAX_QUERY_K: usize = 10;

/// Metadata attached to a vector entry.
pub type Metadata = Map<String, Value>;

/// A chunk of text to index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl VectorEntry {
    /// New entry with a fresh UUID.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// True when every key of `filter` is present with an equal value.
    pub fn matches(&self, filter: &Metadata) -> bool {
        filter.iter().all(|(k, v)| self.metadata.get(k) == Some(v))
    }
}

/// A query hit, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Which vectors `delete_vectors` removes.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorSelector {
    Ids(Vec<String>),
    /// Exact-match on metadata keys.
    Filter(Metadata),
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name for logs ("in_memory", "qdrant", "pinecone").
    fn backend_name(&self) -> &str;

    /// Embed and upsert entries; returns their ids in input order.
    async fn add_documents(&self, entries: Vec<VectorEntry>) -> Result<Vec<String>>;

    /// Split `text` into overlapping chunks and index each one with a copy
    /// of `metadata`.
    async fn add_text(&self, text: &str, metadata: Metadata) -> Result<Vec<String>> {
        let entries: Vec<VectorEntry> = split_text(text)?
            .into_iter()
            .map(|chunk| VectorEntry {
                metadata: metadata.clone(),
                ..VectorEntry::new(chunk)
            })
            .collect();
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        self.add_documents(entries).await
    }

    /// The `k` nearest chunks to `text`.
    async fn similarity_search(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>>;

    /// Nearest chunks rendered for a prompt.
    async fn query(&self, text: &str, k: usize) -> Result<String> {
        let hits = self.similarity_search(text, k.clamp(1, MAX_QUERY_K)).await?;
        Ok(format_chunks(&hits))
    }

    /// Drop the whole index or collection.
    async fn delete_index(&self) -> Result<()>;

    async fn delete_vectors(&self, selector: VectorSelector) -> Result<()>;
}

/// Render hits as `Chunk N` blocks separated by blank lines.
pub fn format_chunks(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("Chunk {}\n{}", i + 1, hit.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the configured backend for index or collection `name`.
pub fn build_vector_store(config: &BujjiConfig, name: &str) -> Result<Arc<dyn VectorStore>> {
    let embedder = build_embedder(config)?;
    if embedder.dimension() != config.vector.dimension() {
        return Err(BujjiError::Configuration(format!(
            "embedder produces {} dimensions but the vector backend expects {}",
            embedder.dimension(),
            config.vector.dimension()
        )));
    }
    match &config.vector {
        VectorBackendConfig::InMemory { dimension } => {
            Ok(Arc::new(InMemoryVectorStore::new(name, embedder, *dimension)))
        }
        #[cfg(feature = "qdrant")]
        VectorBackendConfig::Qdrant {
            url,
            api_key,
            collection,
            dimension,
        } => {
            let url = url
                .clone()
                .or_else(|| config.get_base_url("qdrant"))
                .ok_or_else(|| BujjiError::Configuration("QDRANT_HOST is not set".into()))?;
            let api_key = api_key.clone().or_else(|| config.get_api_key("qdrant"));
            let collection = collection.clone().unwrap_or_else(|| name.to_string());
            Ok(Arc::new(
                QdrantVectorStore::new(url, api_key, collection, embedder).with_dimension(*dimension),
            ))
        }
        #[cfg(feature = "pinecone")]
        VectorBackendConfig::Pinecone {
            api_key,
            index,
            cloud,
            region,
            dimension,
        } => {
            let api_key = match api_key {
                Some(key) => key.clone(),
                None => config.require_api_key("pinecone")?,
            };
            let index = index.clone().unwrap_or_else(|| name.to_string());
            Ok(Arc::new(
                PineconeVectorStore::new(api_key, index, embedder)
                    .with_serverless(cloud.clone(), region.clone())
                    .with_dimension(*dimension),
            ))
        }
        #[allow(unreachable_patterns)]
        other => Err(BujjiError::Configuration(format!(
            "vector backend {other:?} is not compiled into this build"
        ))),
    }
}
