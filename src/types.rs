//! Memory records

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Content-derived identifier of a conversation turn
pub type TurnId = String;

/// Free-form context attached to a turn by the caller
pub type TurnContext = BTreeMap<String, Value>;

/// Current time at the precision snapshots keep (microseconds)
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Render a timestamp the way it is stored in snapshots and index metadata
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 and offset-less ISO 8601 (read as UTC), which is what
/// older snapshots contain.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

mod timestamp_format {
    use super::{format_timestamp, parse_timestamp};
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_timestamp(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// Derive the id of a turn: first 12 hex chars of SHA-256 over user text,
/// response text and timestamp.
pub fn turn_id(user: &str, response: &str, timestamp: &DateTime<Utc>) -> TurnId {
    let mut hasher = Sha256::new();
    hasher.update(user.as_bytes());
    hasher.update(response.as_bytes());
    hasher.update(format_timestamp(timestamp).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

/// One user/response exchange at full fidelity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub id: TurnId,
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    pub user: String,
    #[serde(rename = "nina")]
    pub response: String,
    #[serde(default)]
    pub context: TurnContext,
    /// Importance score (0.0 - 1.0)
    #[serde(rename = "importance_score")]
    pub importance: f32,
    #[serde(default)]
    pub entities: BTreeSet<String>,
    #[serde(default)]
    pub topics: BTreeSet<String>,
}

impl ConversationTurn {
    /// Create a turn with neutral importance and no extracted annotations
    pub fn new(
        user: impl Into<String>,
        response: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let user = user.into();
        let response = response.into();
        let timestamp = timestamp.trunc_subsecs(6);
        Self {
            id: turn_id(&user, &response, &timestamp),
            timestamp,
            user,
            response,
            context: TurnContext::new(),
            importance: 0.5,
            entities: BTreeSet::new(),
            topics: BTreeSet::new(),
        }
    }

    pub fn with_context(mut self, context: TurnContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    pub fn with_entities(mut self, entities: BTreeSet<String>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_topics(mut self, topics: BTreeSet<String>) -> Self {
        self.topics = topics;
        self
    }

    /// Text stored in the vector index for this turn
    pub fn index_text(&self) -> String {
        format!("User: {}\nNina: {}", self.user, self.response)
    }

    /// Metadata stored alongside the indexed text
    pub fn index_metadata(&self) -> Value {
        serde_json::json!({
            "type": "conversation",
            "timestamp": format_timestamp(&self.timestamp),
            "importance": self.importance,
            "entities": self.entities,
            "topics": self.topics,
            "conv_id": self.id,
        })
    }
}

/// Compact, immutable stand-in for a compressed turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompressedSummary {
    /// Id of the turn this summary replaced
    pub id: TurnId,
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    #[serde(default)]
    pub entities: BTreeSet<String>,
    #[serde(default)]
    pub topics: BTreeSet<String>,
    pub importance: f32,
}

/// A learned user preference; the latest write wins
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preference {
    pub value: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
}

/// One learned fact about a topic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactEntry {
    pub fact: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
}

impl FactEntry {
    pub fn index_text(&self, topic: &str) -> String {
        format!("Sujet: {topic}\nFait: {}", self.fact)
    }

    pub fn index_metadata(&self, topic: &str) -> Value {
        serde_json::json!({
            "type": "learned_fact",
            "topic": topic,
            "timestamp": format_timestamp(&self.timestamp),
        })
    }
}

/// Collection sizes, also written to the stats log
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryStats {
    pub conversations: usize,
    pub compressed_memories: usize,
    pub preferences: usize,
    pub learned_facts: usize,
    pub topics: usize,
    pub entities_in_graph: usize,
    pub total_connections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_turn_id_is_content_derived() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let a = ConversationTurn::new("Salut", "Bonjour", ts);
        let b = ConversationTurn::new("Salut", "Bonjour", ts);
        let c = ConversationTurn::new("Salut", "Bonjour", ts + chrono::Duration::seconds(1));

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.id.len(), 12);
        assert!(a.id.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2025-03-01T10:00:00.000000Z").unwrap();
        let naive = parse_timestamp("2025-03-01T10:00:00.000000").unwrap();
        let short = parse_timestamp("2025-03-01T10:00:00").unwrap();
        assert_eq!(rfc, naive);
        assert_eq!(rfc, short);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_turn_serializes_with_snapshot_field_names() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let turn = ConversationTurn::new("Salut", "Bonjour", ts).with_importance(0.8);
        let json = serde_json::to_value(&turn).unwrap();

        assert_eq!(json["nina"], "Bonjour");
        assert_eq!(json["timestamp"], "2025-03-01T10:00:00.000000Z");
        assert!((json["importance_score"].as_f64().unwrap() - 0.8).abs() < 1e-6);

        let back: ConversationTurn = serde_json::from_value(json).unwrap();
        assert_eq!(back, turn);
    }

    #[test]
    fn test_index_metadata() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let turn = ConversationTurn::new("Salut", "Bonjour", ts)
            .with_entities(["Paul".to_string()].into_iter().collect());
        let meta = turn.index_metadata();

        assert_eq!(meta["type"], "conversation");
        assert_eq!(meta["conv_id"], turn.id.as_str());
        assert_eq!(meta["entities"][0], "Paul");
        assert_eq!(turn.index_text(), "User: Salut\nNina: Bonjour");
    }
}
