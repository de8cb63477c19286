use crate::config::IndexMode;
use crate::embedding::DigestEmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::vector_search::{fresh_id, CosineIndex, SubstringIndex};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A text to index, with optional metadata
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub text: String,
    pub metadata: Option<Value>,
}

impl IndexedDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    /// Empty object when the document was indexed without metadata
    pub metadata: Value,
    /// Native similarity, higher is better. `None` for substring matches.
    pub score: Option<f32>,
}

impl SearchHit {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn metadata_f32(&self, key: &str) -> Option<f32> {
        self.metadata.get(key).and_then(Value::as_f64).map(|v| v as f32)
    }
}

/// Append-only store of (vector, text, metadata) entries.
///
/// Implementations embed texts themselves. Every upsert assigns fresh ids,
/// duplicates are kept as distinct entries, and ties in ranking go to the
/// earlier insertion.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &'static str;

    /// Index `documents`, returning one new id per document. Empty input is a no-op.
    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<Vec<String>>;

    /// Up to `k` best matches for `query`
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn clear(&self) -> Result<()>;
}

/// Routes searches to a primary engine and answers from a substring scan
/// whenever the primary reports [`MemoryError::IndexUnavailable`].
///
/// Every document goes to both sides under the same id, so the scan covers
/// everything inserted and hits from either side carry the ids `upsert`
/// returned. A single search never mixes results from the two.
pub struct FallbackIndex {
    primary: Box<dyn VectorIndex>,
    fallback: SubstringIndex,
}

impl FallbackIndex {
    pub fn new(primary: Box<dyn VectorIndex>) -> Self {
        Self {
            primary,
            fallback: SubstringIndex::new(),
        }
    }
}

#[async_trait]
impl VectorIndex for FallbackIndex {
    fn name(&self) -> &'static str {
        "fallback"
    }

    /// Any error other than `IndexUnavailable` is returned with nothing
    /// written to either side.
    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<Vec<String>> {
        let ids = match self.primary.upsert(documents.clone()).await {
            Ok(ids) => ids,
            Err(MemoryError::IndexUnavailable(reason)) => {
                tracing::warn!(
                    backend = self.primary.name(),
                    %reason,
                    "Primary index unavailable on upsert, kept documents for substring search"
                );
                documents.iter().map(|_| fresh_id()).collect()
            }
            Err(e) => return Err(e),
        };
        self.fallback.insert_with_ids(documents, &ids).await;
        Ok(ids)
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        match self.primary.search(query, k).await {
            Err(MemoryError::IndexUnavailable(reason)) => {
                tracing::warn!(
                    backend = self.primary.name(),
                    %reason,
                    "Primary index unavailable, using substring search"
                );
                self.fallback.search(query, k).await
            }
            other => other,
        }
    }

    async fn len(&self) -> usize {
        self.fallback.len().await
    }

    async fn clear(&self) -> Result<()> {
        self.fallback.clear().await?;
        if let Err(e) = self.primary.clear().await {
            tracing::warn!(backend = self.primary.name(), error = %e, "Failed to clear primary index");
        }
        Ok(())
    }
}

/// Build the index selected by `mode`
pub fn build_index(mode: IndexMode, dimension: usize) -> Box<dyn VectorIndex> {
    let embedder = Arc::new(DigestEmbeddingProvider::new(dimension));
    match mode {
        IndexMode::Substring => Box::new(SubstringIndex::new()),
        IndexMode::Cosine => Box::new(CosineIndex::new(embedder)),
        IndexMode::CosineWithFallback => {
            Box::new(FallbackIndex::new(Box::new(CosineIndex::new(embedder))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Stands in for a remote engine that cannot be reached
    struct UnreachableIndex;

    #[async_trait]
    impl VectorIndex for UnreachableIndex {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        async fn upsert(&self, _documents: Vec<IndexedDocument>) -> Result<Vec<String>> {
            Err(MemoryError::IndexUnavailable("connection refused".into()))
        }

        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SearchHit>> {
            Err(MemoryError::IndexUnavailable("connection refused".into()))
        }

        async fn len(&self) -> usize {
            0
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Cosine index that can be switched off mid-test
    struct FlakyIndex {
        inner: CosineIndex,
        down: Arc<AtomicBool>,
    }

    impl FlakyIndex {
        fn check(&self) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                Err(MemoryError::IndexUnavailable("connection reset".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<Vec<String>> {
            self.check()?;
            self.inner.upsert(documents).await
        }

        async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
            self.check()?;
            self.inner.search(query, k).await
        }

        async fn len(&self) -> usize {
            self.inner.len().await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
    }

    /// Rejects every write with an error the fallback must not absorb
    struct RejectingIndex;

    #[async_trait]
    impl VectorIndex for RejectingIndex {
        fn name(&self) -> &'static str {
            "rejecting"
        }

        async fn upsert(&self, _documents: Vec<IndexedDocument>) -> Result<Vec<String>> {
            Err(MemoryError::Embedding("dimension mismatch".into()))
        }

        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }

        async fn len(&self) -> usize {
            0
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    fn docs(texts: &[&str]) -> Vec<IndexedDocument> {
        texts.iter().map(|t| IndexedDocument::new(*t)).collect()
    }

    #[tokio::test]
    async fn test_fallback_answers_when_primary_is_down() {
        let index = FallbackIndex::new(Box::new(UnreachableIndex));
        let ids = index
            .upsert(docs(&["hello world", "foo bar", "hello foo"]))
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);

        let hits = index.search("hello", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.text.contains("hello")));
        assert!(hits.iter().all(|h| h.score.is_none()));
    }

    #[tokio::test]
    async fn test_fallback_hits_keep_upsert_ids_after_primary_goes_down() {
        let down = Arc::new(AtomicBool::new(false));
        let primary = FlakyIndex {
            inner: CosineIndex::new(Arc::new(DigestEmbeddingProvider::new(8))),
            down: Arc::clone(&down),
        };
        let index = FallbackIndex::new(Box::new(primary));

        let ids = index
            .upsert(docs(&["hello world", "foo bar"]))
            .await
            .unwrap();
        let primary_hits = index.search("hello world", 2).await.unwrap();
        assert!(primary_hits.iter().all(|h| ids.contains(&h.id)));

        down.store(true, Ordering::SeqCst);
        let hits = index.search("hello", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score.is_none());
        assert_eq!(hits[0].id, ids[0]);

        // Documents added while the primary is down still get matching ids.
        let later = index.upsert(docs(&["hello again"])).await.unwrap();
        let hits = index.search("again", 5).await.unwrap();
        assert_eq!(hits[0].id, later[0]);
    }

    #[tokio::test]
    async fn test_hard_primary_error_writes_nothing() {
        let index = FallbackIndex::new(Box::new(RejectingIndex));
        let result = index.upsert(docs(&["hello world"])).await;

        assert!(matches!(result, Err(MemoryError::Embedding(_))));
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_fallback_prefers_primary_results() {
        let embedder = Arc::new(DigestEmbeddingProvider::new(8));
        let index = FallbackIndex::new(Box::new(CosineIndex::new(embedder)));
        index
            .upsert(docs(&["alpha", "beta", "gamma"]))
            .await
            .unwrap();

        let hits = index.search("beta", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.score.is_some()));
        assert_eq!(hits[0].text, "beta");
    }

    #[tokio::test]
    async fn test_build_index_modes() {
        assert_eq!(build_index(IndexMode::Substring, 8).name(), "substring");
        assert_eq!(build_index(IndexMode::Cosine, 8).name(), "cosine");
        assert_eq!(build_index(IndexMode::CosineWithFallback, 8).name(), "fallback");
    }

    #[test]
    fn test_hit_metadata_accessors() {
        let hit = SearchHit {
            id: "1".into(),
            text: "t".into(),
            metadata: serde_json::json!({"type": "conversation", "importance": 0.75}),
            score: None,
        };
        assert_eq!(hit.metadata_str("type"), Some("conversation"));
        assert_eq!(hit.metadata_f32("importance"), Some(0.75));
        assert_eq!(hit.metadata_f32("missing"), None);
    }
}
