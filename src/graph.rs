//! Entity co-occurrence graph

use crate::types::TurnId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A named entity and everything it has been seen with
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntityNode {
    /// Entities that co-occurred with this one
    #[serde(default)]
    pub connections: BTreeSet<String>,
    /// Turns mentioning this entity, in ingestion order
    #[serde(default)]
    pub conversations: Vec<TurnId>,
    #[serde(default)]
    pub topics: BTreeSet<String>,
}

/// Undirected graph keyed by entity name.
///
/// Nodes are created on first mention and only ever grow; edges are always
/// stored in both directions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EntityGraph {
    nodes: BTreeMap<String, EntityNode>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `entities` and `topics` appeared together in `conversation_id`
    pub fn update(
        &mut self,
        conversation_id: &str,
        entities: &BTreeSet<String>,
        topics: &BTreeSet<String>,
    ) {
        for entity in entities {
            let node = self.nodes.entry(entity.clone()).or_default();
            if !node.conversations.iter().any(|id| id == conversation_id) {
                node.conversations.push(conversation_id.to_string());
            }
            node.topics.extend(topics.iter().cloned());
        }

        let names: Vec<&String> = entities.iter().collect();
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                self.link(a, b);
            }
        }
    }

    fn link(&mut self, a: &str, b: &str) {
        if let Some(node) = self.nodes.get_mut(a) {
            node.connections.insert(b.to_string());
        }
        if let Some(node) = self.nodes.get_mut(b) {
            node.connections.insert(a.to_string());
        }
    }

    /// Connections and topics of `entity`; both empty when it is unknown
    pub fn neighbors(&self, entity: &str) -> (Vec<String>, Vec<String>) {
        match self.nodes.get(entity) {
            Some(node) => (
                node.connections.iter().cloned().collect(),
                node.topics.iter().cloned().collect(),
            ),
            None => (Vec::new(), Vec::new()),
        }
    }

    pub fn node(&self, entity: &str) -> Option<&EntityNode> {
        self.nodes.get(entity)
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.nodes.contains_key(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sum of connection-list sizes; each edge counts once per endpoint
    pub fn total_connections(&self) -> usize {
        self.nodes.values().map(|n| n.connections.len()).sum()
    }

    /// Every edge has its mirror
    pub fn is_symmetric(&self) -> bool {
        self.nodes.iter().all(|(name, node)| {
            node.connections.iter().all(|other| {
                self.nodes
                    .get(other)
                    .is_some_and(|n| n.connections.contains(name))
            })
        })
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}
