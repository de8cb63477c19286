//! On-disk snapshot of the whole memory state
//!
//! The snapshot is a single JSON document written atomically (temp file in
//! the same directory, then rename). Reading is lenient: a section that is
//! missing or fails to decode comes back empty, and a list entry that fails
//! to decode is dropped, instead of the whole load failing.

use crate::error::{MemoryError, Result};
use crate::graph::EntityGraph;
use crate::types::{CompressedSummary, ConversationTurn, FactEntry, MemoryStats, Preference, TurnId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub conversation_history: Vec<ConversationTurn>,
    pub user_preferences: BTreeMap<String, Preference>,
    pub learned_facts: BTreeMap<String, Vec<FactEntry>>,
    pub memory_graph: EntityGraph,
    pub compressed_memories: Vec<CompressedSummary>,
    pub memory_importance_scores: BTreeMap<TurnId, f32>,
    pub last_updated: Option<String>,
}

/// Sections or entries dropped while decoding a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotIssues {
    pub problems: Vec<String>,
}

impl SnapshotIssues {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

fn decode_section<T: DeserializeOwned + Default>(
    root: &mut Map<String, Value>,
    key: &str,
    issues: &mut SnapshotIssues,
) -> T {
    let Some(raw) = root.remove(key) else {
        return T::default();
    };
    if raw.is_null() {
        return T::default();
    }
    match serde_json::from_value(raw) {
        Ok(value) => value,
        Err(e) => {
            issues.problems.push(format!("{key}: {e}"));
            T::default()
        }
    }
}

fn decode_list<T: DeserializeOwned>(
    root: &mut Map<String, Value>,
    key: &str,
    issues: &mut SnapshotIssues,
) -> Vec<T> {
    match root.remove(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| match serde_json::from_value(item) {
                Ok(value) => Some(value),
                Err(e) => {
                    issues.problems.push(format!("{key}[{i}]: {e}"));
                    None
                }
            })
            .collect(),
        Some(_) => {
            issues.problems.push(format!("{key}: expected a list"));
            Vec::new()
        }
    }
}

impl Snapshot {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decode a snapshot, recovering from malformed sections
    pub fn from_json(bytes: &[u8]) -> Result<(Self, SnapshotIssues)> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| MemoryError::MalformedSnapshot(format!("not valid JSON: {e}")))?;
        let Value::Object(mut root) = value else {
            return Err(MemoryError::MalformedSnapshot(
                "top level is not an object".into(),
            ));
        };

        let mut issues = SnapshotIssues::default();
        let snapshot = Self {
            conversation_history: decode_list(&mut root, "conversation_history", &mut issues),
            user_preferences: decode_section(&mut root, "user_preferences", &mut issues),
            learned_facts: decode_section(&mut root, "learned_facts", &mut issues),
            memory_graph: decode_section(&mut root, "memory_graph", &mut issues),
            compressed_memories: decode_list(&mut root, "compressed_memories", &mut issues),
            memory_importance_scores: decode_section(
                &mut root,
                "memory_importance_scores",
                &mut issues,
            ),
            last_updated: decode_section(&mut root, "last_updated", &mut issues),
        };

        Ok((snapshot, issues))
    }

    /// Read the snapshot at `path`; `None` when there is no file
    pub fn read(path: &Path) -> Result<Option<(Self, SnapshotIssues)>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MemoryError::Persistence(format!(
                    "Failed to read snapshot '{}': {e}",
                    path.display()
                )))
            }
        };
        Self::from_json(&bytes).map(Some)
    }
}

/// Replace `path` with `bytes` atomically.
///
/// The temp file is removed if anything fails before the rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| {
        MemoryError::Persistence(format!("Failed to create '{}': {e}", dir.display()))
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| MemoryError::Persistence(format!("Failed to create temp file: {e}")))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| MemoryError::Persistence(format!("Failed to write snapshot: {e}")))?;
    tmp.persist(path).map_err(|e| {
        MemoryError::Persistence(format!(
            "Failed to move snapshot into '{}': {}",
            path.display(),
            e.error
        ))
    })?;
    Ok(())
}

#[derive(Serialize)]
struct StatsLine<'a> {
    timestamp: &'a str,
    #[serde(flatten)]
    stats: &'a MemoryStats,
}

/// Append one JSON line of collection counts to the stats log
pub fn append_stats(path: &Path, stats: &MemoryStats, timestamp: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let line = serde_json::to_string(&StatsLine { timestamp, stats })?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}
