//! Token-budgeted context assembly for response generation

use crate::graph::EntityGraph;
use crate::retrieval::RankedConversation;
use crate::types::{ConversationTurn, Preference};
use std::collections::{BTreeMap, BTreeSet};

const SIMILAR_HEADER: &str = "Conversations similaires:";
const ENTITIES_HEADER: &str = "Entités connues:";
const PREFERENCES_HEADER: &str = "Préférences utilisateur:";
const RECENT_HEADER: &str = "Contexte récent:";

/// Everything the context builder may draw from
#[derive(Debug, Clone, Copy)]
pub struct ContextSources<'a> {
    /// Composite-ranked turns similar to the query
    pub similar: &'a [RankedConversation],
    /// Entities detected in the query
    pub query_entities: &'a BTreeSet<String>,
    pub graph: &'a EntityGraph,
    pub preferences: &'a BTreeMap<String, Preference>,
    /// Full-fidelity history, oldest first
    pub history: &'a [ConversationTurn],
}

/// Context window layout and budget
#[derive(Debug, Clone)]
pub struct ContextWindow {
    /// Maximum token budget (approximate)
    pub max_tokens: usize,
    /// Similar turns to fetch
    pub similar_limit: usize,
    /// Characters kept per similar-turn snippet
    pub snippet_chars: usize,
    /// Connections and topics listed per entity
    pub graph_items: usize,
    pub max_preferences: usize,
    pub recent_turns: usize,
    /// Characters kept of each side of a recent turn
    pub preview_chars: usize,
    /// Preferences are added only while usage is below this share of the budget
    pub preference_budget_ratio: f32,
    /// Recent turns are added only while usage is below this share of the budget
    pub recent_budget_ratio: f32,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            max_tokens: 5000,
            similar_limit: 3,
            snippet_chars: 150,
            graph_items: 3,
            max_preferences: 3,
            recent_turns: 2,
            preview_chars: 30,
            preference_budget_ratio: 0.8,
            recent_budget_ratio: 0.6,
        }
    }
}

const ENTITY_COST: f32 = 20.0;
const PREFERENCE_COST: f32 = 10.0;
const RECENT_COST: f32 = 15.0;

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        let head: String = text.chars().take(limit).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn head_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

impl ContextWindow {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            ..Default::default()
        }
    }

    /// Rough token estimation (~1.3 tokens per word)
    pub fn estimate_tokens(text: &str) -> f32 {
        text.split_whitespace().count() as f32 * 1.3
    }

    /// Assemble the context string; empty when nothing qualifies.
    ///
    /// Sections come in fixed priority order: similar turns, known entities,
    /// preferences, recent turns. The last two are only added while enough
    /// of the budget is left.
    pub fn build(&self, sources: ContextSources<'_>) -> String {
        let budget = self.max_tokens as f32;
        let mut parts: Vec<String> = Vec::new();
        let mut used = 0.0f32;

        // Layer 1: semantically similar turns
        if !sources.similar.is_empty() && used < budget {
            parts.push(SIMILAR_HEADER.to_string());
            for conv in sources.similar.iter().take(self.similar_limit) {
                if used >= budget {
                    break;
                }
                let text = truncate_chars(&conv.text, self.snippet_chars);
                used += Self::estimate_tokens(&text);
                parts.push(format!("- {text}"));
            }
        }

        // Layer 2: what the graph knows about entities in the query
        let known: Vec<&str> = sources
            .query_entities
            .iter()
            .map(String::as_str)
            .filter(|e| sources.graph.contains(e))
            .collect();
        if !known.is_empty() && used < budget {
            parts.push(ENTITIES_HEADER.to_string());
            for entity in known {
                if used >= budget {
                    break;
                }
                let (connections, topics) = sources.graph.neighbors(entity);
                if !connections.is_empty() {
                    let listed: Vec<_> = connections.into_iter().take(self.graph_items).collect();
                    parts.push(format!("- {entity}: lié à {}", listed.join(", ")));
                }
                if !topics.is_empty() {
                    let listed: Vec<_> = topics.into_iter().take(self.graph_items).collect();
                    parts.push(format!("- {entity}: sujets {}", listed.join(", ")));
                }
                used += ENTITY_COST;
            }
        }

        // Layer 3: preferences
        if !sources.preferences.is_empty() && used < budget * self.preference_budget_ratio {
            parts.push(PREFERENCES_HEADER.to_string());
            for (key, pref) in sources.preferences.iter().take(self.max_preferences) {
                parts.push(format!("- {key}: {}", pref.value));
                used += PREFERENCE_COST;
            }
        }

        // Layer 4: latest raw turns
        if used < budget * self.recent_budget_ratio {
            let start = sources.history.len().saturating_sub(self.recent_turns);
            let recent = &sources.history[start..];
            if !recent.is_empty() {
                parts.push(RECENT_HEADER.to_string());
                for turn in recent {
                    parts.push(format!(
                        "- User: {}... Nina: {}...",
                        head_chars(&turn.user, self.preview_chars),
                        head_chars(&turn.response, self.preview_chars)
                    ));
                    used += RECENT_COST;
                }
            }
        }

        tracing::debug!(tokens = used, lines = parts.len(), "Built response context");
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ranked(text: &str) -> RankedConversation {
        RankedConversation {
            text: text.to_string(),
            turn_id: None,
            timestamp: None,
            composite_score: 0.5,
            relevance: 0.5,
            recency: 0.5,
            importance: 0.5,
            entities: Vec::new(),
            topics: Vec::new(),
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        similar: Vec<RankedConversation>,
        entities: BTreeSet<String>,
        graph: EntityGraph,
        preferences: BTreeMap<String, Preference>,
        history: Vec<ConversationTurn>,
    }

    impl Fixture {
        fn empty() -> Self {
            Self {
                similar: Vec::new(),
                entities: BTreeSet::new(),
                graph: EntityGraph::new(),
                preferences: BTreeMap::new(),
                history: Vec::new(),
            }
        }

        fn sources(&self) -> ContextSources<'_> {
            ContextSources {
                similar: &self.similar,
                query_entities: &self.entities,
                graph: &self.graph,
                preferences: &self.preferences,
                history: &self.history,
            }
        }
    }

    #[test]
    fn test_empty_sources_give_empty_context() {
        let fixture = Fixture::empty();
        assert_eq!(ContextWindow::default().build(fixture.sources()), "");
    }

    #[test]
    fn test_all_sections_in_order() {
        let mut fixture = Fixture::empty();
        fixture.similar = vec![ranked("User: salut\nNina: bonjour")];
        fixture.entities = set(&["Paul", "Inconnu"]);
        fixture
            .graph
            .update("c1", &set(&["Paul", "Lyon"]), &set(&["travail"]));
        fixture.preferences.insert(
            "langue".into(),
            Preference {
                value: "français".into(),
                timestamp: Utc::now(),
            },
        );
        fixture
            .history
            .push(ConversationTurn::new("Je vis à Lyon", "Belle ville", Utc::now()));

        let context = ContextWindow::default().build(fixture.sources());
        let lines: Vec<_> = context.lines().collect();

        assert_eq!(lines[0], SIMILAR_HEADER);
        assert_eq!(lines[1], "- User: salut");
        assert_eq!(lines[2], "Nina: bonjour");
        assert_eq!(lines[3], ENTITIES_HEADER);
        assert_eq!(lines[4], "- Paul: lié à Lyon");
        assert_eq!(lines[5], "- Paul: sujets travail");
        assert_eq!(lines[6], PREFERENCES_HEADER);
        assert_eq!(lines[7], "- langue: français");
        assert_eq!(lines[8], RECENT_HEADER);
        assert_eq!(lines[9], "- User: Je vis à Lyon... Nina: Belle ville...");
        assert!(!context.contains("Inconnu"));
    }

    #[test]
    fn test_snippets_are_truncated() {
        let mut fixture = Fixture::empty();
        fixture.similar = vec![ranked(&"a".repeat(200))];
        let context = ContextWindow::default().build(fixture.sources());
        assert!(context.contains(&format!("- {}...", "a".repeat(150))));
        assert!(!context.contains(&"a".repeat(151)));
    }

    #[test]
    fn test_tight_budget_skips_low_priority_sections() {
        let mut fixture = Fixture::empty();
        fixture.similar = vec![ranked("un deux trois quatre cinq six sept huit neuf dix")];
        fixture.preferences.insert(
            "langue".into(),
            Preference {
                value: "français".into(),
                timestamp: Utc::now(),
            },
        );
        fixture
            .history
            .push(ConversationTurn::new("salut", "bonjour", Utc::now()));

        // 10 words cost 13 tokens, over 80% of a 15 token budget.
        let context = ContextWindow::new(15).build(fixture.sources());
        assert!(context.starts_with(SIMILAR_HEADER));
        assert!(!context.contains(PREFERENCES_HEADER));
        assert!(!context.contains(RECENT_HEADER));

        let roomy = ContextWindow::new(1000).build(fixture.sources());
        assert!(roomy.contains(PREFERENCES_HEADER));
        assert!(roomy.contains(RECENT_HEADER));
    }

    #[test]
    fn test_recent_turns_are_the_latest_two() {
        let mut fixture = Fixture::empty();
        for text in ["un", "deux", "trois"] {
            fixture
                .history
                .push(ConversationTurn::new(text, "ok", Utc::now()));
        }
        let context = ContextWindow::default().build(fixture.sources());
        assert!(!context.contains("User: un..."));
        assert!(context.contains("User: deux..."));
        assert!(context.contains("User: trois..."));
    }

    #[test]
    fn test_graph_lists_are_capped() {
        let mut fixture = Fixture::empty();
        fixture.entities = set(&["Paul"]);
        fixture.graph.update(
            "c1",
            &set(&["Paul", "Anne", "Bob", "Cyril", "Denis"]),
            &BTreeSet::new(),
        );
        let context = ContextWindow::default().build(fixture.sources());
        assert!(context.contains("- Paul: lié à Anne, Bob, Cyril"));
        assert!(!context.contains("Denis"));
    }

    #[test]
    fn test_estimate_tokens() {
        assert!((ContextWindow::estimate_tokens("un deux trois") - 3.9).abs() < 1e-5);
        assert_eq!(ContextWindow::estimate_tokens(""), 0.0);
    }
}
