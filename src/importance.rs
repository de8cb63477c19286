//! Lexical importance scoring of conversation turns

use crate::lexicon::Lexicon;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Increments applied by [`ImportanceScorer`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportanceWeights {
    /// Starting score of every turn
    pub base: f32,
    /// Added once per distinct high-importance term present
    pub keyword: f32,
    /// Added when the user talks about themselves
    pub personal: f32,
    /// Added when the response explains or defines something
    pub definitional: f32,
    /// Added for long exchanges
    pub length: f32,
    /// Word count above which an exchange is long
    pub long_exchange_words: usize,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            base: 0.5,
            keyword: 0.1,
            personal: 0.2,
            definitional: 0.15,
            length: 0.1,
            long_exchange_words: 50,
        }
    }
}

/// Scores a turn from lexical signals only. No state, no history.
#[derive(Debug, Clone)]
pub struct ImportanceScorer {
    lexicon: Arc<Lexicon>,
    weights: ImportanceWeights,
}

impl ImportanceScorer {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self::with_weights(lexicon, ImportanceWeights::default())
    }

    pub fn with_weights(lexicon: Arc<Lexicon>, weights: ImportanceWeights) -> Self {
        Self { lexicon, weights }
    }

    /// Importance of a user/response pair, within `[0, 1]`
    pub fn score(&self, user_text: &str, response_text: &str) -> f32 {
        let w = &self.weights;
        let text = format!("{user_text} {response_text}").to_lowercase();
        let user = user_text.to_lowercase();
        let response = response_text.to_lowercase();

        let mut importance = w.base;

        let keyword_hits = self
            .lexicon
            .high_importance
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .count();
        importance += w.keyword * keyword_hits as f32;

        if self.lexicon.first_person.iter().any(|p| user.contains(p.as_str())) {
            importance += w.personal;
        }

        if self
            .lexicon
            .definitional
            .iter()
            .any(|m| response.contains(m.as_str()))
        {
            importance += w.definitional;
        }

        if text.split_whitespace().count() > w.long_exchange_words {
            importance += w.length;
        }

        importance.clamp(0.0, 1.0)
    }
}
