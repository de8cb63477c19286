//! Store configuration

use crate::error::{MemoryError, Result};
use crate::importance::ImportanceWeights;
use crate::lexicon::Lexicon;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which similarity engine backs the vector index
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    /// Case-insensitive substring scan in insertion order
    #[default]
    Substring,
    /// Exact cosine similarity over digest embeddings
    Cosine,
    /// Cosine, answering from the substring scan whenever the engine is unavailable
    CosineWithFallback,
}

/// When and what the retention compressor demotes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetentionPolicy {
    /// History size at which compression starts running
    pub history_threshold: usize,
    /// Turns older than this are eligible
    pub max_age_days: i64,
    /// Turns scoring at or above this are kept at full fidelity
    pub importance_ceiling: f32,
    /// Upper bound on turns compressed by a single pass; the rest wait for the next one
    pub max_per_pass: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            history_threshold: 100,
            max_age_days: 30,
            importance_ceiling: 0.7,
            max_per_pass: 500,
        }
    }
}

/// Weights of the composite conversation ranking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RankingWeights {
    pub relevance: f32,
    pub recency: f32,
    pub importance: f32,
    /// Per-day decay in `1 / (1 + decay * age_days)`
    pub recency_decay: f32,
    /// Relevance used for hits the index returned without a score
    pub default_relevance: f32,
    /// Importance used for hits whose metadata has none
    pub default_importance: f32,
    /// Index hits fetched per requested result
    pub candidate_multiplier: usize,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            relevance: 0.6,
            recency: 0.25,
            importance: 0.15,
            recency_decay: 0.1,
            default_relevance: 0.5,
            default_importance: 0.5,
            candidate_multiplier: 3,
        }
    }
}

/// Configuration for a [`crate::MemoryStore`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Snapshot file holding the whole persisted state
    pub snapshot_path: PathBuf,
    /// Append-only JSONL stats log written after each save; `None` disables it
    pub stats_log_path: Option<PathBuf>,
    pub embedding_dimension: usize,
    pub index_mode: IndexMode,
    pub retention: RetentionPolicy,
    pub ranking: RankingWeights,
    /// Increments used to score each turn's importance
    pub importance: ImportanceWeights,
    /// Default token budget of `get_context_for_response`
    pub context_max_tokens: usize,
    /// TOML lexicon replacing the built-in keyword tables
    pub lexicon_path: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/nina_memory.json"),
            stats_log_path: Some(PathBuf::from("logs/memory_stats.jsonl")),
            embedding_dimension: 8,
            index_mode: IndexMode::default(),
            retention: RetentionPolicy::default(),
            ranking: RankingWeights::default(),
            importance: ImportanceWeights::default(),
            context_max_tokens: 5000,
            lexicon_path: None,
        }
    }
}

impl MemoryConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Configuration(format!("Failed to read config '{}': {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| MemoryError::Configuration(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding_dimension == 0 {
            return Err(MemoryError::Configuration(
                "embedding_dimension must be at least 1".into(),
            ));
        }

        let weights = [
            ("relevance", self.ranking.relevance),
            ("recency", self.ranking.recency),
            ("importance", self.ranking.importance),
            ("importance_ceiling", self.retention.importance_ceiling),
        ];
        for (name, value) in weights {
            if !(0.0..=1.0).contains(&value) {
                return Err(MemoryError::Configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        let increments = [
            ("importance.base", self.importance.base),
            ("importance.keyword", self.importance.keyword),
            ("importance.personal", self.importance.personal),
            ("importance.definitional", self.importance.definitional),
            ("importance.length", self.importance.length),
        ];
        for (name, value) in increments {
            if value < 0.0 {
                return Err(MemoryError::Configuration(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }

        if self.ranking.recency_decay < 0.0 {
            return Err(MemoryError::Configuration(
                "recency_decay must not be negative".into(),
            ));
        }

        Ok(())
    }

    /// The lexicon named by `lexicon_path`, or the built-in one
    pub fn lexicon(&self) -> Result<Lexicon> {
        match &self.lexicon_path {
            Some(path) => Lexicon::from_toml_file(path),
            None => Ok(Lexicon::default()),
        }
    }
}

/// Builder for memory config
pub struct MemoryConfigBuilder {
    config: MemoryConfig,
}

impl MemoryConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MemoryConfig::default(),
        }
    }

    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = path.into();
        self
    }

    pub fn stats_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.stats_log_path = path;
        self
    }

    pub fn embedding_dimension(mut self, dimension: usize) -> Self {
        self.config.embedding_dimension = dimension;
        self
    }

    pub fn index_mode(mut self, mode: IndexMode) -> Self {
        self.config.index_mode = mode;
        self
    }

    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.config.retention = retention;
        self
    }

    pub fn ranking(mut self, ranking: RankingWeights) -> Self {
        self.config.ranking = ranking;
        self
    }

    pub fn importance(mut self, importance: ImportanceWeights) -> Self {
        self.config.importance = importance;
        self
    }

    pub fn context_max_tokens(mut self, tokens: usize) -> Self {
        self.config.context_max_tokens = tokens;
        self
    }

    pub fn lexicon_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.lexicon_path = Some(path.into());
        self
    }

    pub fn build(self) -> MemoryConfig {
        self.config
    }
}

impl Default for MemoryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
