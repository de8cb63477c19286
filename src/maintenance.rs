//! Retention: demote old, low-importance turns to one-line summaries

use crate::config::RetentionPolicy;
use crate::types::{CompressedSummary, ConversationTurn};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

const PREVIEW_LIMIT: usize = 50;
const PREVIEW_KEEP: usize = 47;

/// Outcome of one compression pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompressionReport {
    /// Turns examined
    pub checked: usize,
    /// Turns old and unimportant enough to compress
    pub candidates: usize,
    /// Turns moved to the archive by this pass
    pub compressed: usize,
    /// Candidates left for a later pass because of the per-pass cap
    pub deferred: usize,
}

/// Cut `text` to 47 characters plus `...` when it is longer than 50
fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_LIMIT {
        let head: String = text.chars().take(PREVIEW_KEEP).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// One-line summary of a turn: `User: <u> | Nina: <n>`
pub fn summarize_turn(turn: &ConversationTurn) -> String {
    format!(
        "User: {} | Nina: {}",
        preview(&turn.user),
        preview(&turn.response)
    )
}

#[derive(Debug, Clone)]
pub struct RetentionCompressor {
    policy: RetentionPolicy,
}

impl RetentionCompressor {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Whether history has grown enough for a pass
    pub fn is_due(&self, history_len: usize) -> bool {
        history_len >= self.policy.history_threshold
    }

    pub fn is_candidate(&self, turn: &ConversationTurn, now: DateTime<Utc>) -> bool {
        let cutoff = now - Duration::days(self.policy.max_age_days);
        turn.timestamp < cutoff && turn.importance < self.policy.importance_ceiling
    }

    /// Move candidates from `history` into `archive`.
    ///
    /// Turns whose id is already archived are not summarized again, so a
    /// second pass over unchanged state is a no-op. At most `max_per_pass`
    /// turns move per call; the oldest-inserted go first.
    ///
    /// Only history and archive change. Index entries of compressed turns are
    /// left in place and disappear when the store next rebuilds its index on load.
    pub fn compress(
        &self,
        history: &mut Vec<ConversationTurn>,
        archive: &mut Vec<CompressedSummary>,
        now: DateTime<Utc>,
    ) -> CompressionReport {
        let mut report = CompressionReport {
            checked: history.len(),
            ..CompressionReport::default()
        };

        let mut archived: HashSet<String> = archive.iter().map(|s| s.id.clone()).collect();
        let mut moved: HashSet<String> = HashSet::new();

        for turn in history.iter().filter(|t| self.is_candidate(t, now)) {
            report.candidates += 1;
            if archived.contains(&turn.id) {
                continue;
            }
            if moved.len() >= self.policy.max_per_pass {
                report.deferred += 1;
                continue;
            }

            archive.push(CompressedSummary {
                id: turn.id.clone(),
                timestamp: turn.timestamp,
                summary: summarize_turn(turn),
                entities: turn.entities.clone(),
                topics: turn.topics.clone(),
                importance: turn.importance,
            });
            archived.insert(turn.id.clone());
            moved.insert(turn.id.clone());
        }

        history.retain(|t| !moved.contains(&t.id));
        report.compressed = moved.len();

        if report.compressed > 0 {
            tracing::info!(
                compressed = report.compressed,
                deferred = report.deferred,
                remaining = history.len(),
                "Compressed old conversation turns"
            );
        }

        report
    }
}

impl Default for RetentionCompressor {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}
