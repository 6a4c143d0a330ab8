//! ActivationEngine — seed + BFS spread + classification (spec §4.8)

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::memory::{Level, Memory};
use crate::storage::{ConnectionGraph, MetadataStore, VectorStore};

/// Result of a single activation pass: core and peripheral memories plus the
/// raw activation strength of every visited id.
#[derive(Debug, Clone, Default)]
pub struct ActivationResult {
    pub core: Vec<Memory>,
    pub peripheral: Vec<Memory>,
    pub activation_strengths: HashMap<String, f32>,
    /// `true` if a seed search or a spread lookup failed and was skipped
    /// rather than propagated, so this result may be missing memories that a
    /// healthy store would have surfaced.
    pub degraded: bool,
}

impl ActivationResult {
    /// All ids that landed in core or peripheral, for bridge deduplication.
    pub fn activated_ids(&self) -> HashSet<String> {
        self.activation_strengths.keys().cloned().collect()
    }
}

pub struct ActivationEngine {
    config: EngineConfig,
    vectors: Arc<dyn VectorStore>,
    metadata: Arc<dyn MetadataStore>,
    graph: ConnectionGraph,
}

impl ActivationEngine {
    pub fn new(
        config: EngineConfig,
        vectors: Arc<dyn VectorStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let graph = ConnectionGraph::new(metadata.clone());
        Self {
            config,
            vectors,
            metadata,
            graph,
        }
    }

    /// Seed phase: cosine top-k at L0, falling back to L1 then L2 with
    /// progressively lower thresholds if the prior level yields nothing.
    fn seed(&self, project_id: &str, query_vector: &[f32]) -> (Vec<(String, f32)>, bool) {
        let cascades = [
            (Level::Concept, self.config.activation_threshold),
            (Level::Context, self.config.activation_threshold - 0.1),
            (Level::Episode, self.config.activation_threshold - 0.2),
        ];
        let mut degraded = false;
        for (level, threshold) in cascades {
            let hits = match self
                .vectors
                .search(project_id, level, query_vector, self.config.seed_k, None)
            {
                Ok(hits) => hits,
                Err(_) => {
                    degraded = true;
                    continue;
                }
            };
            let above: Vec<(String, f32)> = hits
                .into_iter()
                .filter(|(_, score, _)| *score >= threshold)
                .map(|(id, score, _)| (id, score))
                .collect();
            if !above.is_empty() {
                return (above, degraded);
            }
        }
        (Vec::new(), degraded)
    }

    /// Run the full seed + spread + classify algorithm (spec §4.8).
    pub fn activate(&self, project_id: &str, query_vector: &[f32]) -> ActivationResult {
        let (seeds, mut degraded) = self.seed(project_id, query_vector);
        if seeds.is_empty() {
            return ActivationResult {
                degraded,
                ..ActivationResult::default()
            };
        }

        let mut activation: HashMap<String, f32> = HashMap::new();
        for (id, score) in &seeds {
            let entry = activation.entry(id.clone()).or_insert(0.0);
            if *score > *entry {
                *entry = *score;
            }
        }

        let mut queue: VecDeque<(String, f32, u32)> = seeds
            .iter()
            .map(|(id, score)| (id.clone(), *score, 0u32))
            .collect();

        while let Some((id, parent_activation, depth)) = queue.pop_front() {
            if activation.len() >= self.config.max_activations {
                break;
            }
            if depth >= self.config.max_depth {
                continue;
            }
            let neighbors = match self
                .graph
                .neighbors(&id, self.config.spread_threshold, None)
            {
                Ok(n) => n,
                Err(_) => {
                    degraded = true;
                    continue;
                }
            };
            for (neighbor_id, _connection_type, edge_strength) in neighbors {
                let contribution = parent_activation * edge_strength * self.config.hop_decay;
                let current = activation.entry(neighbor_id.clone()).or_insert(0.0);
                if contribution > *current {
                    *current = contribution;
                    if activation.len() < self.config.max_activations {
                        queue.push_back((neighbor_id, contribution, depth + 1));
                    }
                }
            }
        }

        let mut result = self.classify(project_id, activation);
        result.degraded = degraded;
        result
    }

    fn classify(&self, project_id: &str, activation: HashMap<String, f32>) -> ActivationResult {
        let mut scored: Vec<(String, f32, Option<Memory>)> = activation
            .iter()
            .map(|(id, strength)| {
                let memory = self.metadata.get_memory(id).ok().flatten();
                (id.clone(), *strength, memory)
            })
            .filter(|(_, _, m)| {
                m.as_ref()
                    .map(|m| m.project_id == project_id)
                    .unwrap_or(false)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let a_accessed = a.2.as_ref().map(|m| m.last_accessed_at);
                    let b_accessed = b.2.as_ref().map(|m| m.last_accessed_at);
                    b_accessed.cmp(&a_accessed)
                })
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut core = Vec::new();
        let mut peripheral = Vec::new();
        for (_, strength, memory) in &scored {
            let Some(memory) = memory else { continue };
            if *strength >= self.config.core_threshold {
                core.push(memory.clone());
            } else if *strength >= self.config.peripheral_threshold {
                peripheral.push(memory.clone());
            }
        }

        ActivationResult {
            core,
            peripheral,
            activation_strengths: activation,
            degraded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ConnectionType, Level};
    use crate::storage::{SqliteMetadataStore, UsearchVectorStore};

    fn setup() -> (ActivationEngine, Arc<dyn MetadataStore>, Arc<dyn VectorStore>) {
        let mut config = EngineConfig::default();
        config.embedding_dimension = 4;
        config.cognitive_dimension = 4;
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteMetadataStore::open_in_memory().unwrap());
        let vectors: Arc<dyn VectorStore> = Arc::new(UsearchVectorStore::new());
        vectors
            .ensure_collection("proj", Level::Concept, 4)
            .unwrap();
        vectors
            .ensure_collection("proj", Level::Context, 4)
            .unwrap();
        vectors
            .ensure_collection("proj", Level::Episode, 4)
            .unwrap();
        let engine = ActivationEngine::new(config, vectors.clone(), metadata.clone());
        (engine, metadata, vectors)
    }

    fn memory(id: &str, level: Level) -> Memory {
        let mut m = Memory::new_episodic("proj", level, format!("content {id}"), vec![0.0; 4], [0.0; 16]);
        m.id = id.to_string();
        m
    }

    #[test]
    fn empty_store_yields_empty_activation() {
        let (engine, _metadata, _vectors) = setup();
        let result = engine.activate("proj", &[1.0, 0.0, 0.0, 0.0]);
        assert!(result.core.is_empty());
        assert!(result.peripheral.is_empty());
    }

    #[test]
    fn strong_seed_lands_in_core() {
        let (engine, metadata, vectors) = setup();
        let m = memory("seed", Level::Concept);
        metadata.create_memory(&m).unwrap();
        vectors
            .upsert(
                "proj",
                Level::Concept,
                "seed",
                &[1.0, 0.0, 0.0, 0.0],
                Default::default(),
            )
            .unwrap();

        let result = engine.activate("proj", &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(result.core.len(), 1);
        assert_eq!(result.core[0].id, "seed");
    }

    #[test]
    fn spread_reaches_connected_neighbor() {
        let (engine, metadata, vectors) = setup();
        let seed = memory("seed", Level::Concept);
        let neighbor = memory("neighbor", Level::Concept);
        metadata.create_memory(&seed).unwrap();
        metadata.create_memory(&neighbor).unwrap();
        metadata
            .upsert_edge("seed", "neighbor", ConnectionType::Associative, 0.9)
            .unwrap();
        vectors
            .upsert(
                "proj",
                Level::Concept,
                "seed",
                &[1.0, 0.0, 0.0, 0.0],
                Default::default(),
            )
            .unwrap();

        let result = engine.activate("proj", &[1.0, 0.0, 0.0, 0.0]);
        assert!(result.activation_strengths.contains_key("neighbor"));
    }
}
