//! # nina-memory - Hierarchical conversational memory for an assistant
//!
//! Records user/response turns, scores their importance, links the
//! entities they mention, and retrieves them by similarity, recency and
//! importance to build a token-budgeted context for the next response.
//! Old, unimportant turns are compressed into one-line summaries, and the
//! whole state persists as a single JSON snapshot.
//!
//! ```no_run
//! use nina_memory::{MemoryConfig, MemoryStore};
//!
//! # async fn demo() -> nina_memory::Result<()> {
//! let mut store = MemoryStore::open(MemoryConfig::default()).await?;
//! store.add_conversation("Mon nom est Paul", "Bonjour Paul", None).await;
//! let context = store.get_context_for_response("Paul", None).await;
//! # let _ = context;
//! # Ok(())
//! # }
//! ```
//!
//! A store has a single writer: mutating calls take `&mut self`, and
//! callers sharing one across tasks must serialize access themselves.

pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod importance;
pub mod lexicon;
pub mod maintenance;
pub mod retrieval;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod vector_backend;
pub mod vector_search;

pub use config::{IndexMode, MemoryConfig, MemoryConfigBuilder, RankingWeights, RetentionPolicy};
pub use context::{ContextSources, ContextWindow};
pub use embedding::{DigestEmbeddingProvider, EmbeddingProvider};
pub use error::{MemoryError, Result};
pub use extraction::{extract_entities, extract_topics};
pub use graph::{EntityGraph, EntityNode};
pub use importance::{ImportanceScorer, ImportanceWeights};
pub use lexicon::Lexicon;
pub use maintenance::{summarize_turn, CompressionReport, RetentionCompressor};
pub use retrieval::{rank_conversations, recency_factor, RankedConversation};
pub use snapshot::{Snapshot, SnapshotIssues};
pub use store::MemoryStore;
pub use types::{
    CompressedSummary, ConversationTurn, FactEntry, MemoryStats, Preference, TurnContext, TurnId,
};
pub use vector_backend::{build_index, FallbackIndex, IndexedDocument, SearchHit, VectorIndex};
pub use vector_search::{cosine_similarity, CosineIndex, SubstringIndex};
