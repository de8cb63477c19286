//! Conversational memory store
//!
//! `MemoryStore` owns every collection (history, preferences, facts, entity
//! graph, compressed archive) plus the vector index, and persists them as a
//! single snapshot after each mutation.
//!
//! # Usage constraint
//!
//! One writer per store. Mutating operations take `&mut self`; callers that
//! share a store across tasks must serialize `add_conversation`, `save` and
//! `load` themselves (for example behind a `tokio::sync::Mutex`). Two stores
//! pointed at the same snapshot file will overwrite each other.

use crate::config::MemoryConfig;
use crate::context::{ContextSources, ContextWindow};
use crate::error::{MemoryError, Result};
use crate::extraction::{extract_entities, extract_topics};
use crate::graph::EntityGraph;
use crate::importance::ImportanceScorer;
use crate::lexicon::Lexicon;
use crate::maintenance::{CompressionReport, RetentionCompressor};
use crate::retrieval::{rank_conversations, RankedConversation};
use crate::snapshot::{append_stats, write_atomic, Snapshot};
use crate::types::{
    self, format_timestamp, CompressedSummary, ConversationTurn, FactEntry, MemoryStats,
    Preference, TurnContext, TurnId,
};
use crate::vector_backend::{build_index, IndexedDocument, SearchHit, VectorIndex};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct MemoryStore {
    config: MemoryConfig,
    lexicon: Arc<Lexicon>,
    scorer: ImportanceScorer,
    compressor: RetentionCompressor,
    index: Box<dyn VectorIndex>,
    history: Vec<ConversationTurn>,
    preferences: BTreeMap<String, Preference>,
    facts: BTreeMap<String, Vec<FactEntry>>,
    graph: EntityGraph,
    compressed: Vec<CompressedSummary>,
    importance_scores: BTreeMap<TurnId, f32>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("snapshot_path", &self.config.snapshot_path)
            .field("index", &self.index.name())
            .field("history", &self.history.len())
            .field("compressed", &self.compressed.len())
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store with the index selected by `config.index_mode`.
    ///
    /// Nothing is read from disk; call [`MemoryStore::load`] or use
    /// [`MemoryStore::open`].
    pub fn new(config: MemoryConfig) -> Result<Self> {
        let index = build_index(config.index_mode, config.embedding_dimension);
        Self::with_index(config, index)
    }

    /// Create an empty store around a caller-supplied index
    pub fn with_index(config: MemoryConfig, index: Box<dyn VectorIndex>) -> Result<Self> {
        config.validate()?;
        let lexicon = Arc::new(config.lexicon()?);
        tracing::debug!(
            lexicon = %lexicon.version,
            index = index.name(),
            snapshot = %config.snapshot_path.display(),
            "Creating memory store"
        );

        Ok(Self {
            scorer: ImportanceScorer::with_weights(
                Arc::clone(&lexicon),
                config.importance.clone(),
            ),
            compressor: RetentionCompressor::new(config.retention.clone()),
            lexicon,
            index,
            history: Vec::new(),
            preferences: BTreeMap::new(),
            facts: BTreeMap::new(),
            graph: EntityGraph::new(),
            compressed: Vec::new(),
            importance_scores: BTreeMap::new(),
            config,
        })
    }

    /// Create a store and restore it from its snapshot, if one exists
    pub async fn open(config: MemoryConfig) -> Result<Self> {
        let mut store = Self::new(config)?;
        store.load().await;
        Ok(store)
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    // ─── Conversations ──────────────────────────────────────────────────────

    /// Record a user/response exchange and return its id.
    ///
    /// Indexing and persistence failures are logged; the turn is kept in
    /// history regardless. Turns compressed by the pass that may follow stay
    /// searchable in the vector index until the next `load()` rebuilds it.
    pub async fn add_conversation(
        &mut self,
        user_text: &str,
        response_text: &str,
        context: Option<TurnContext>,
    ) -> TurnId {
        self.add_conversation_at(user_text, response_text, context, types::now())
            .await
    }

    /// Same as [`MemoryStore::add_conversation`] with an explicit timestamp
    pub async fn add_conversation_at(
        &mut self,
        user_text: &str,
        response_text: &str,
        context: Option<TurnContext>,
        timestamp: DateTime<Utc>,
    ) -> TurnId {
        let importance = self.scorer.score(user_text, response_text);
        let combined = format!("{user_text} {response_text}");
        let entities = extract_entities(&combined, &self.lexicon);
        let topics = extract_topics(&combined, &self.lexicon);

        let turn = ConversationTurn::new(user_text, response_text, timestamp)
            .with_context(context.unwrap_or_default())
            .with_importance(importance)
            .with_entities(entities)
            .with_topics(topics);
        let id = turn.id.clone();

        self.graph.update(&id, &turn.entities, &turn.topics);
        let document = IndexedDocument::new(turn.index_text()).with_metadata(turn.index_metadata());
        self.importance_scores.insert(id.clone(), turn.importance);
        tracing::debug!(
            turn_id = %id,
            importance = turn.importance,
            entities = turn.entities.len(),
            topics = turn.topics.len(),
            "Recorded conversation turn"
        );
        self.history.push(turn);

        if let Err(e) = self.index.upsert(vec![document]).await {
            tracing::warn!(turn_id = %id, error = %e, "Failed to index conversation turn");
        }

        if self.compressor.is_due(self.history.len()) {
            self.compressor
                .compress(&mut self.history, &mut self.compressed, types::now());
        }

        self.save().await;
        id
    }

    /// Full-fidelity history, oldest first
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// The last `limit` turns of history
    pub fn get_recent_conversations(&self, limit: usize) -> &[ConversationTurn] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    pub fn compressed_memories(&self) -> &[CompressedSummary] {
        &self.compressed
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn importance_of(&self, id: &str) -> Option<f32> {
        self.importance_scores.get(id).copied()
    }

    // ─── Retrieval ──────────────────────────────────────────────────────────

    /// Raw index search; empty when the index fails
    pub async fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        match self.index.search(query, k).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "Index search failed");
                Vec::new()
            }
        }
    }

    /// Past conversation turns ranked by relevance, recency and importance
    pub async fn search_conversations(&self, query: &str, limit: usize) -> Vec<RankedConversation> {
        if limit == 0 {
            return Vec::new();
        }
        let weights = &self.config.ranking;
        let fetch = limit.saturating_mul(weights.candidate_multiplier.max(1));
        let hits = self.search(query, fetch).await;
        rank_conversations(&hits, limit, weights, types::now())
    }

    /// Context string for answering `query`, within `max_tokens`
    /// (`context_max_tokens` from the config when `None`)
    pub async fn get_context_for_response(&self, query: &str, max_tokens: Option<usize>) -> String {
        let window = ContextWindow::new(max_tokens.unwrap_or(self.config.context_max_tokens));
        let similar = self.search_conversations(query, window.similar_limit).await;
        let query_entities = extract_entities(query, &self.lexicon);

        window.build(ContextSources {
            similar: &similar,
            query_entities: &query_entities,
            graph: &self.graph,
            preferences: &self.preferences,
            history: &self.history,
        })
    }

    // ─── Preferences & facts ────────────────────────────────────────────────

    /// Set a preference; the latest value wins
    pub async fn learn_user_preference(&mut self, key: &str, value: &str) {
        self.preferences.insert(
            key.to_string(),
            Preference {
                value: value.to_string(),
                timestamp: types::now(),
            },
        );
        tracing::debug!(key, "Learned user preference");
        self.save().await;
    }

    pub fn get_user_preference(&self, key: &str) -> Option<&str> {
        self.preferences.get(key).map(|p| p.value.as_str())
    }

    pub fn preferences(&self) -> &BTreeMap<String, Preference> {
        &self.preferences
    }

    /// Append a fact to `topic` and index it for search
    pub async fn learn_fact(&mut self, topic: &str, fact: &str) {
        let entry = FactEntry {
            fact: fact.to_string(),
            timestamp: types::now(),
        };
        let document = IndexedDocument::new(entry.index_text(topic))
            .with_metadata(entry.index_metadata(topic));
        self.facts.entry(topic.to_string()).or_default().push(entry);

        if let Err(e) = self.index.upsert(vec![document]).await {
            tracing::warn!(topic, error = %e, "Failed to index learned fact");
        }
        tracing::debug!(topic, "Learned fact");
        self.save().await;
    }

    /// Facts about `topic` in the order they were learned
    pub fn get_facts_about(&self, topic: &str) -> &[FactEntry] {
        self.facts.get(topic).map(Vec::as_slice).unwrap_or_default()
    }

    // ─── Maintenance ────────────────────────────────────────────────────────

    /// Run a compression pass now, regardless of history size
    pub async fn run_compression(&mut self) -> CompressionReport {
        let report = self
            .compressor
            .compress(&mut self.history, &mut self.compressed, types::now());
        if report.compressed > 0 {
            self.save().await;
        }
        report
    }

    pub fn get_memory_stats(&self) -> MemoryStats {
        MemoryStats {
            conversations: self.history.len(),
            compressed_memories: self.compressed.len(),
            preferences: self.preferences.len(),
            learned_facts: self.facts.values().map(Vec::len).sum(),
            topics: self.facts.len(),
            entities_in_graph: self.graph.len(),
            total_connections: self.graph.total_connections(),
        }
    }

    /// Drop every collection and the index, then persist the empty state
    pub async fn clear(&mut self) {
        self.reset();
        if let Err(e) = self.index.clear().await {
            tracing::warn!(error = %e, "Failed to clear vector index");
        }
        tracing::info!("Cleared all memory");
        self.save().await;
    }

    fn reset(&mut self) {
        self.history.clear();
        self.preferences.clear();
        self.facts.clear();
        self.graph.clear();
        self.compressed.clear();
        self.importance_scores.clear();
    }

    // ─── Persistence ────────────────────────────────────────────────────────

    /// Current state as a snapshot stamped with the current time
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            conversation_history: self.history.clone(),
            user_preferences: self.preferences.clone(),
            learned_facts: self.facts.clone(),
            memory_graph: self.graph.clone(),
            compressed_memories: self.compressed.clone(),
            memory_importance_scores: self.importance_scores.clone(),
            last_updated: Some(format_timestamp(&types::now())),
        }
    }

    /// Persist the state, logging instead of returning failures.
    ///
    /// Returns whether the snapshot was written.
    pub async fn save(&self) -> bool {
        match self.try_save().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    path = %self.config.snapshot_path.display(),
                    error = %e,
                    "Failed to save memory snapshot"
                );
                false
            }
        }
    }

    /// Persist the state atomically and append a stats line
    pub async fn try_save(&self) -> Result<()> {
        let snapshot = self.snapshot();
        let bytes = snapshot.to_json()?;
        let timestamp = snapshot.last_updated.unwrap_or_default();
        let path = self.config.snapshot_path.clone();
        let stats_path = self.config.stats_log_path.clone();
        let stats = self.get_memory_stats();

        tokio::task::spawn_blocking(move || -> Result<()> {
            write_atomic(&path, &bytes)?;
            if let Some(stats_path) = stats_path {
                if let Err(e) = append_stats(&stats_path, &stats, &timestamp) {
                    tracing::warn!(
                        path = %stats_path.display(),
                        error = %e,
                        "Failed to append memory stats"
                    );
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| MemoryError::Persistence(format!("Snapshot writer task failed: {e}")))?
    }

    /// Restore state from the snapshot, logging instead of returning failures.
    ///
    /// A missing snapshot leaves the store empty. An unreadable one leaves
    /// the in-memory state untouched.
    pub async fn load(&mut self) -> bool {
        match self.try_load().await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    path = %self.config.snapshot_path.display(),
                    error = %e,
                    "Failed to load memory snapshot"
                );
                false
            }
        }
    }

    /// Restore state from the snapshot; `Ok(false)` when there is none.
    ///
    /// Sections that fail to decode come back empty and are reported in the
    /// log. The vector index is rebuilt from the restored history and facts.
    pub async fn try_load(&mut self) -> Result<bool> {
        let path = self.config.snapshot_path.clone();
        let read = tokio::task::spawn_blocking(move || Snapshot::read(&path))
            .await
            .map_err(|e| MemoryError::Persistence(format!("Snapshot reader task failed: {e}")))??;

        let Some((snapshot, issues)) = read else {
            tracing::info!(
                path = %self.config.snapshot_path.display(),
                "No memory snapshot found, starting empty"
            );
            self.reset();
            self.rebuild_index().await;
            return Ok(false);
        };

        for problem in &issues.problems {
            tracing::warn!(%problem, "Dropped malformed snapshot content");
        }

        self.history = snapshot.conversation_history;
        self.preferences = snapshot.user_preferences;
        self.facts = snapshot.learned_facts;
        self.graph = snapshot.memory_graph;
        self.compressed = snapshot.compressed_memories;
        self.importance_scores = snapshot.memory_importance_scores;
        for turn in &self.history {
            self.importance_scores
                .entry(turn.id.clone())
                .or_insert(turn.importance);
        }

        self.rebuild_index().await;
        tracing::info!(
            conversations = self.history.len(),
            compressed = self.compressed.len(),
            facts = self.facts.len(),
            entities = self.graph.len(),
            "Loaded memory snapshot"
        );
        Ok(true)
    }

    async fn rebuild_index(&self) {
        if let Err(e) = self.index.clear().await {
            tracing::warn!(error = %e, "Failed to clear vector index before rebuild");
        }

        let mut documents: Vec<IndexedDocument> = self
            .history
            .iter()
            .map(|turn| IndexedDocument::new(turn.index_text()).with_metadata(turn.index_metadata()))
            .collect();
        for (topic, entries) in &self.facts {
            documents.extend(entries.iter().map(|entry| {
                IndexedDocument::new(entry.index_text(topic))
                    .with_metadata(entry.index_metadata(topic))
            }));
        }
        if documents.is_empty() {
            return;
        }

        let count = documents.len();
        match self.index.upsert(documents).await {
            Ok(_) => tracing::debug!(documents = count, "Rebuilt vector index"),
            Err(e) => tracing::warn!(error = %e, "Failed to rebuild vector index"),
        }
    }
}
