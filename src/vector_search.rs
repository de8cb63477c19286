//! In-process vector index implementations

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::vector_backend::{IndexedDocument, SearchHit, VectorIndex};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    vector: Vec<f32>,
    text: String,
    metadata: Value,
}

impl Entry {
    fn hit(&self, score: Option<f32>) -> SearchHit {
        SearchHit {
            id: self.id.clone(),
            text: self.text.clone(),
            metadata: self.metadata.clone(),
            score,
        }
    }
}

pub(crate) fn fresh_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn metadata_or_empty(metadata: Option<Value>) -> Value {
    metadata.unwrap_or_else(|| Value::Object(serde_json::Map::new()))
}

/// Exact nearest-neighbour search by cosine similarity
pub struct CosineIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    entries: RwLock<Vec<Entry>>,
}

impl CosineIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self
            .embedder
            .embed(texts)
            .await
            .map_err(|e| MemoryError::IndexUnavailable(format!("Embedding failed: {e}")))?;
        if vectors.len() != texts.len() {
            return Err(MemoryError::IndexUnavailable(format!(
                "Embedding provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl VectorIndex for CosineIndex {
    fn name(&self) -> &'static str {
        "cosine"
    }

    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = self.embed(&texts).await?;

        let mut entries = self.entries.write().await;
        let mut ids = Vec::with_capacity(documents.len());
        for (doc, vector) in documents.into_iter().zip(vectors) {
            let id = fresh_id();
            ids.push(id.clone());
            entries.push(Entry {
                id,
                vector,
                text: doc.text,
                metadata: metadata_or_empty(doc.metadata),
            });
        }

        tracing::debug!(count = ids.len(), total = entries.len(), "Indexed documents");
        Ok(ids)
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embed(std::slice::from_ref(&query.to_string()))
            .await?
            .pop()
            .unwrap_or_default();

        let mut scored: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(&query_vector, &e.vector)))
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| entries[i].hit(Some(score)))
            .collect())
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Case-insensitive substring scan over raw texts, in insertion order.
///
/// Used where no similarity engine is available.
#[derive(Default)]
pub struct SubstringIndex {
    entries: RwLock<Vec<Entry>>,
}

impl SubstringIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `documents` under caller-chosen `ids`, paired by position.
    ///
    /// Lets a wrapper mirror another index so both sides report the same id
    /// for the same document. Extra documents or ids are ignored.
    pub async fn insert_with_ids(&self, documents: Vec<IndexedDocument>, ids: &[String]) {
        let mut entries = self.entries.write().await;
        for (doc, id) in documents.into_iter().zip(ids) {
            entries.push(Entry {
                id: id.clone(),
                vector: Vec::new(),
                text: doc.text,
                metadata: metadata_or_empty(doc.metadata),
            });
        }
    }
}

#[async_trait]
impl VectorIndex for SubstringIndex {
    fn name(&self) -> &'static str {
        "substring"
    }

    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<Vec<String>> {
        let ids: Vec<String> = documents.iter().map(|_| fresh_id()).collect();
        self.insert_with_ids(documents, &ids).await;
        Ok(ids)
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let needle = query.to_lowercase();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.text.to_lowercase().contains(&needle))
            .take(k)
            .map(|e| e.hit(None))
            .collect())
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
