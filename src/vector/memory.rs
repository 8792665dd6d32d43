//! In-process vector store using cosine similarity.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::embeddings::{Embedder, InputType};
use super::{ScoredChunk, VectorEntry, VectorSelector, VectorStore};
use crate::error::{BujjiError, Result};

struct StoredVector {
    entry: VectorEntry,
    vector: Vec<f32>,
    magnitude: f32,
}

/// Keeps every entry in memory and ranks by brute-force cosine similarity.
pub struct InMemoryVectorStore {
    name: String,
    embedder: Arc<dyn Embedder>,
    dimension: usize,
    entries: RwLock<Vec<StoredVector>>,
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl InMemoryVectorStore {
    pub fn new(name: impl Into<String>, embedder: Arc<dyn Embedder>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            embedder,
            dimension,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn magnitude(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_mag: f32, b: &[f32], b_mag: f32) -> f32 {
    if a_mag == 0.0 || b_mag == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_mag * b_mag)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend_name(&self) -> &str {
        "in_memory"
    }

    async fn add_documents(&self, entries: Vec<VectorEntry>) -> Result<Vec<String>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        let vectors = self.embedder.embed(&texts, InputType::Document).await?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(BujjiError::vector(
                "in_memory",
                format!("embedding has {} dimensions, index expects {}", bad.len(), self.dimension),
            ));
        }

        let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        let mut stored = self.entries.write().await;
        for (entry, vector) in entries.into_iter().zip(vectors) {
            let item = StoredVector {
                magnitude: magnitude(&vector),
                entry,
                vector,
            };
            match stored.iter().position(|s| s.entry.id == item.entry.id) {
                Some(idx) => stored[idx] = item,
                None => stored.push(item),
            }
        }
        debug!(store = %self.name, added = ids.len(), total = stored.len(), "indexed documents");
        Ok(ids)
    }

    async fn similarity_search(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query = self.embedder.embed_query(text).await?;
        let query_mag = magnitude(&query);
        let stored = self.entries.read().await;

        let mut scored: Vec<(usize, f32)> = stored
            .iter()
            .enumerate()
            .map(|(idx, s)| (idx, cosine(&query, query_mag, &s.vector, s.magnitude)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(idx, score)| {
                let entry = &stored[idx].entry;
                ScoredChunk {
                    id: entry.id.clone(),
                    text: entry.text.clone(),
                    score,
                    metadata: entry.metadata.clone(),
                }
            })
            .collect())
    }

    async fn delete_index(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn delete_vectors(&self, selector: VectorSelector) -> Result<()> {
        let mut stored = self.entries.write().await;
        match selector {
            VectorSelector::Ids(ids) => stored.retain(|s| !ids.contains(&s.entry.id)),
            VectorSelector::Filter(filter) => stored.retain(|s| !s.entry.matches(&filter)),
        }
        Ok(())
    }
}
