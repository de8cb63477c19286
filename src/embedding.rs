use crate::error::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn dimension(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Zero-config embedding provider.
///
/// Hashes the UTF-8 text with SHA-256 and reads the digest as little-endian
/// `u32` words scaled into `[0, 1)`. Deterministic, no network, no model
/// downloads, and *not* semantic: only identical texts get identical vectors.
///
/// A single digest covers 8 dimensions. Larger dimensions extend it with
/// `SHA-256(text || block_index_le)` blocks, so the first 8 components never
/// depend on the configured dimension.
#[derive(Debug, Clone)]
pub struct DigestEmbeddingProvider {
    dimension: usize,
}

const WORDS_PER_BLOCK: usize = 8;
const U32_SCALE: f64 = 4_294_967_296.0;
/// Largest `f32` below 1.0
const BELOW_ONE: f32 = 0.999_999_94;

/// `word / 2^32`, narrowed to `f32` without rounding up to 1.0
fn unit_component(word: u32) -> f32 {
    ((word as f64 / U32_SCALE) as f32).min(BELOW_ONE)
}

impl DigestEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = Vec::with_capacity(self.dimension);
        let mut block = 0u32;

        while vec.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            if block > 0 {
                hasher.update(block.to_le_bytes());
            }
            let digest = hasher.finalize();

            for word in digest.chunks_exact(4).take(WORDS_PER_BLOCK) {
                if vec.len() == self.dimension {
                    break;
                }
                let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                vec.push(unit_component(value));
            }
            block += 1;
        }

        vec
    }
}

impl Default for DigestEmbeddingProvider {
    fn default() -> Self {
        Self::new(WORDS_PER_BLOCK)
    }
}

#[async_trait]
impl EmbeddingProvider for DigestEmbeddingProvider {
    fn name(&self) -> &'static str {
        "sha256-digest"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_is_deterministic() {
        let embedder = DigestEmbeddingProvider::default();
        let a = embedder.embed_one("hello world");
        let b = embedder.embed_one("hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a.iter().all(|v| (0.0..1.0).contains(v)));
        assert_ne!(a, embedder.embed_one("hello world!"));
    }

    #[test]
    fn test_matches_digest_words() {
        let embedder = DigestEmbeddingProvider::default();
        let digest = Sha256::digest("abc".as_bytes());
        let first = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let v = embedder.embed_one("abc");
        assert_eq!(v[0], (first as f64 / 4_294_967_296.0) as f32);
    }

    #[test]
    fn test_components_stay_below_one() {
        assert_eq!(unit_component(0), 0.0);
        assert_eq!(unit_component(1 << 31), 0.5);
        // u32::MAX / 2^32 rounds to 1.0 in f32 and must be pulled back under it.
        assert!(unit_component(u32::MAX) < 1.0);
        assert_eq!(unit_component(u32::MAX), BELOW_ONE);
    }

    #[test]
    fn test_dimension_is_configurable() {
        let small = DigestEmbeddingProvider::new(3).embed_one("texte");
        let base = DigestEmbeddingProvider::new(8).embed_one("texte");
        let large = DigestEmbeddingProvider::new(20).embed_one("texte");

        assert_eq!(small.len(), 3);
        assert_eq!(large.len(), 20);
        assert_eq!(&small[..], &base[..3]);
        assert_eq!(&large[..8], &base[..]);
    }

    #[tokio::test]
    async fn test_batch_embed() {
        let embedder = DigestEmbeddingProvider::new(8);
        let out = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], embedder.embed_one("a"));
    }
}
