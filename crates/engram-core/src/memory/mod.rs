//! Memory module — core data model
//!
//! Implements the Memory/Connection/AccessEvent/BridgeCacheEntry types and
//! invariants from spec.md §3: hierarchy levels, episodic/semantic kind,
//! the cognitive vector, and the tagged `MemoryPayload` variant used to
//! carry type-specific attributes (document chunk, commit, pattern, ...)
//! alongside the common header, per Design Notes §9.

mod payload;

pub use payload::{CommitType, FileChange, FileChangeKind, MemoryPayload};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Hierarchy level. Lower is more abstract; `level` is immutable after
/// creation (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Level {
    /// L0 — abstract/principle-like content.
    Concept = 0,
    /// L1 — contextual/expository content.
    Context = 1,
    /// L2 — procedural/episodic content.
    Episode = 2,
}

impl Level {
    /// Parse from the raw integer stored in the metadata row.
    pub fn from_i32(v: i32) -> Result<Self, crate::error::EngineError> {
        match v {
            0 => Ok(Level::Concept),
            1 => Ok(Level::Context),
            2 => Ok(Level::Episode),
            other => Err(crate::error::EngineError::LevelOutOfRange(other)),
        }
    }

    /// Name used in vector collection namespacing (`{project_id}_{level_name}`).
    pub fn collection_name(&self) -> &'static str {
        match self {
            Level::Concept => "concepts",
            Level::Context => "contexts",
            Level::Episode => "episodes",
        }
    }
}

/// Episodic memories decay fast and may be promoted; semantic memories are
/// created only by consolidation and never expire automatically (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Episodic,
    Semantic,
}

/// Typed connection between two memories (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Hierarchical,
    Sequential,
    Associative,
}

/// Which bucket a retrieved memory landed in (spec §4.10, §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalClass {
    Core,
    Peripheral,
    Bridge,
}

/// A single experience stored in the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub level: Level,
    pub kind: Kind,
    pub content: String,
    pub cognitive_vector: Vec<f32>,
    pub dimensions: [f32; 16],
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: i64,
    pub importance: f64,
    pub decay_rate: f64,
    pub parent_id: Option<String>,
    pub tags: HashSet<String>,
    pub source_path: Option<String>,
    pub project_id: String,
    pub payload: MemoryPayload,
}

impl Memory {
    /// Construct a new episodic memory with sensible defaults, ready to be
    /// handed to `MetadataStore::create_memory` / `VectorStore::upsert`.
    pub fn new_episodic(
        project_id: impl Into<String>,
        level: Level,
        content: impl Into<String>,
        cognitive_vector: Vec<f32>,
        dimensions: [f32; 16],
    ) -> Self {
        let now = Utc::now();
        Self {
            id: crate::ids::new_opaque_id(),
            level,
            kind: Kind::Episodic,
            content: content.into(),
            cognitive_vector,
            dimensions,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            importance: 0.0,
            decay_rate: 0.1,
            parent_id: None,
            tags: HashSet::new(),
            source_path: None,
            project_id: project_id.into(),
            payload: MemoryPayload::Generic,
        }
    }
}

/// A directed, typed edge between two memory ids (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub source_id: String,
    pub target_id: String,
    pub strength: f32,
    pub connection_type: ConnectionType,
    pub created_at: DateTime<Utc>,
    pub last_activated_at: Option<DateTime<Utc>>,
    pub activation_count: i64,
}

/// Append-only record of a retrieval touching a memory (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEvent {
    pub memory_id: String,
    pub at: DateTime<Utc>,
    pub retrieval_class: RetrievalClass,
}

/// A cached bridge-discovery result for a given `(query_fingerprint, memory_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeCacheEntry {
    pub query_fingerprint: String,
    pub memory_id: String,
    pub bridge_score: f32,
    pub novelty: f32,
    pub connection_potential: f32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering_matches_hierarchy() {
        assert!(Level::Concept < Level::Context);
        assert!(Level::Context < Level::Episode);
    }

    #[test]
    fn level_round_trips_through_i32() {
        for level in [Level::Concept, Level::Context, Level::Episode] {
            let v = level as i32;
            assert_eq!(Level::from_i32(v).unwrap(), level);
        }
    }

    #[test]
    fn level_out_of_range_is_rejected() {
        assert!(Level::from_i32(7).is_err());
    }

    #[test]
    fn new_episodic_memory_has_no_parent_and_zero_access() {
        let m = Memory::new_episodic("proj", Level::Episode, "hello", vec![0.0; 4], [0.0; 16]);
        assert!(m.parent_id.is_none());
        assert_eq!(m.access_count, 0);
        assert_eq!(m.kind, Kind::Episodic);
    }
}
