use crate::config::RankingWeights;
use crate::types::parse_timestamp;
use crate::vector_backend::SearchHit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A conversation hit re-ranked by composite score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedConversation {
    pub text: String,
    pub turn_id: Option<String>,
    pub timestamp: Option<String>,
    pub composite_score: f32,
    pub relevance: f32,
    pub recency: f32,
    pub importance: f32,
    pub entities: Vec<String>,
    pub topics: Vec<String>,
}

/// `1 / (1 + decay * age_days)`; 0 when the timestamp is missing or unreadable.
///
/// Timestamps in the future count as age zero.
pub fn recency_factor(timestamp: Option<&str>, now: DateTime<Utc>, decay: f32) -> f32 {
    let Some(ts) = timestamp.and_then(parse_timestamp) else {
        return 0.0;
    };
    let age_days = ((now - ts).num_milliseconds().max(0) as f64 / 86_400_000.0) as f32;
    1.0 / (1.0 + decay * age_days)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Score a single conversation hit
pub fn score_hit(hit: &SearchHit, weights: &RankingWeights, now: DateTime<Utc>) -> RankedConversation {
    let relevance = hit.score.unwrap_or(weights.default_relevance);
    let importance = hit
        .metadata_f32("importance")
        .unwrap_or(weights.default_importance);
    let timestamp = hit.metadata_str("timestamp").map(str::to_string);
    let recency = recency_factor(timestamp.as_deref(), now, weights.recency_decay);

    let composite_score = weights.relevance * relevance
        + weights.recency * recency
        + weights.importance * importance;

    RankedConversation {
        text: hit.text.clone(),
        turn_id: hit.metadata_str("conv_id").map(str::to_string),
        timestamp,
        composite_score,
        relevance,
        recency,
        importance,
        entities: string_list(hit.metadata.get("entities")),
        topics: string_list(hit.metadata.get("topics")),
    }
}

/// Keep conversation hits, order them by composite score and return the top `limit`.
///
/// Equal scores keep the index's order.
pub fn rank_conversations(
    hits: &[SearchHit],
    limit: usize,
    weights: &RankingWeights,
    now: DateTime<Utc>,
) -> Vec<RankedConversation> {
    let mut ranked: Vec<RankedConversation> = hits
        .iter()
        .filter(|h| h.metadata_str("type") == Some("conversation"))
        .map(|h| score_hit(h, weights, now))
        .collect();

    ranked.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::format_timestamp;
    use chrono::Duration;

    fn hit(text: &str, score: Option<f32>, importance: f32, age_days: i64, now: DateTime<Utc>) -> SearchHit {
        SearchHit {
            id: text.to_string(),
            text: text.to_string(),
            metadata: serde_json::json!({
                "type": "conversation",
                "importance": importance,
                "timestamp": format_timestamp(&(now - Duration::days(age_days))),
                "conv_id": format!("id-{text}"),
                "entities": ["Paul"],
                "topics": ["travail"],
            }),
            score,
        }
    }

    fn position(ranked: &[RankedConversation], text: &str) -> usize {
        ranked.iter().position(|r| r.text == text).unwrap()
    }

    #[test]
    fn test_recency_factor() {
        let now = Utc::now();
        let today = format_timestamp(&now);
        let ten_days = format_timestamp(&(now - Duration::days(10)));

        assert!((recency_factor(Some(&today), now, 0.1) - 1.0).abs() < 1e-4);
        assert!((recency_factor(Some(&ten_days), now, 0.1) - 0.5).abs() < 1e-4);
        assert_eq!(recency_factor(None, now, 0.1), 0.0);
        assert_eq!(recency_factor(Some("not a date"), now, 0.1), 0.0);
    }

    #[test]
    fn test_composite_score() {
        let now = Utc::now();
        let weights = RankingWeights::default();
        let r = score_hit(&hit("a", Some(1.0), 1.0, 0, now), &weights, now);
        assert!((r.composite_score - 1.0).abs() < 1e-4);
        assert_eq!(r.turn_id.as_deref(), Some("id-a"));
        assert_eq!(r.entities, vec!["Paul"]);

        // Substring hits carry no score and fall back to the default relevance.
        let r = score_hit(&hit("b", None, 0.0, 0, now), &weights, now);
        assert!((r.relevance - 0.5).abs() < 1e-6);
        assert!((r.composite_score - (0.6 * 0.5 + 0.25)).abs() < 1e-4);
    }

    #[test]
    fn test_missing_metadata_defaults() {
        let now = Utc::now();
        let bare = SearchHit {
            id: "x".into(),
            text: "x".into(),
            metadata: serde_json::json!({"type": "conversation"}),
            score: Some(0.0),
        };
        let r = score_hit(&bare, &RankingWeights::default(), now);
        assert_eq!(r.recency, 0.0);
        assert!((r.importance - 0.5).abs() < 1e-6);
        assert!(r.entities.is_empty());
    }

    #[test]
    fn test_rank_filters_non_conversations_and_truncates() {
        let now = Utc::now();
        let mut fact = hit("fact", Some(1.0), 1.0, 0, now);
        fact.metadata["type"] = serde_json::json!("learned_fact");
        let hits = vec![
            hit("low", Some(0.1), 0.5, 5, now),
            fact,
            hit("high", Some(0.9), 0.5, 5, now),
            hit("mid", Some(0.5), 0.5, 5, now),
        ];

        let ranked = rank_conversations(&hits, 2, &RankingWeights::default(), now);
        let texts: Vec<_> = ranked.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["high", "mid"]);
    }

    #[test]
    fn test_ties_keep_index_order() {
        let now = Utc::now();
        let hits = vec![
            hit("first", Some(0.5), 0.5, 3, now),
            hit("second", Some(0.5), 0.5, 3, now),
        ];
        let ranked = rank_conversations(&hits, 2, &RankingWeights::default(), now);
        assert_eq!(ranked[0].text, "first");
        assert_eq!(ranked[1].text, "second");
    }

    #[test]
    fn test_raising_importance_or_recency_never_lowers_rank() {
        let now = Utc::now();
        let weights = RankingWeights::default();
        let base = vec![
            hit("a", Some(0.7), 0.4, 12, now),
            hit("b", Some(0.6), 0.5, 6, now),
            hit("target", Some(0.65), 0.3, 20, now),
            hit("c", Some(0.5), 0.9, 1, now),
        ];
        let before = position(&rank_conversations(&base, 4, &weights, now), "target");

        let mut more_important = base.clone();
        more_important[2] = hit("target", Some(0.65), 0.95, 20, now);
        let after = position(&rank_conversations(&more_important, 4, &weights, now), "target");
        assert!(after <= before);

        let mut more_recent = base.clone();
        more_recent[2] = hit("target", Some(0.65), 0.3, 0, now);
        let after = position(&rank_conversations(&more_recent, 4, &weights, now), "target");
        assert!(after <= before);
    }
}
