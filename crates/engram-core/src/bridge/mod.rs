//! BridgeDiscovery — distance-inversion bridge search (spec §4.9)

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::config::EngineConfig;
use crate::embeddings::cosine_similarity;
use crate::memory::{Level, Memory};
use crate::storage::{MetadataStore, VectorStore};

/// One bridge candidate: a memory not directly similar to the query but
/// strongly connected, via vector-space proximity, to an activated memory.
#[derive(Debug, Clone)]
pub struct Bridge {
    pub memory: Memory,
    pub novelty: f32,
    pub connection_potential: f32,
    pub bridge_score: f32,
}

struct CacheEntry {
    bridges: Vec<Bridge>,
    degraded: bool,
    computed_at: Instant,
}

pub struct BridgeDiscovery {
    config: EngineConfig,
    vectors: Arc<dyn VectorStore>,
    metadata: Arc<dyn MetadataStore>,
    cache: Mutex<lru::LruCache<String, CacheEntry>>,
}

impl BridgeDiscovery {
    pub fn new(
        config: EngineConfig,
        vectors: Arc<dyn VectorStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let cache = Mutex::new(lru::LruCache::new(NonZeroUsize::new(256).unwrap()));
        Self {
            config,
            vectors,
            metadata,
            cache,
        }
    }

    fn fingerprint(query_vector: &[f32], activated_ids: &HashSet<String>) -> String {
        let mut hasher = Sha256::new();
        for x in query_vector {
            hasher.update(x.to_le_bytes());
        }
        let mut ids: Vec<&String> = activated_ids.iter().collect();
        ids.sort();
        for id in ids {
            hasher.update(id.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Find bridges for `query_vector`, given the set of already-activated
    /// memory ids and their cognitive vectors.
    pub fn discover(
        &self,
        project_id: &str,
        query_vector: &[f32],
        activated: &[(String, Vec<f32>)],
    ) -> (Vec<Bridge>, bool) {
        if activated.is_empty() {
            return (Vec::new(), false);
        }
        let activated_ids: HashSet<String> = activated.iter().map(|(id, _)| id.clone()).collect();
        let fingerprint = Self::fingerprint(query_vector, &activated_ids);

        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(&fingerprint) {
                if entry.computed_at.elapsed()
                    < Duration::from_secs(self.config.bridge_cache_ttl_secs)
                {
                    return (entry.bridges.clone(), entry.degraded);
                }
            }
        }

        let (bridges, degraded) = self.compute(project_id, query_vector, activated, &activated_ids);

        let mut cache = self.cache.lock().unwrap();
        cache.put(
            fingerprint,
            CacheEntry {
                bridges: bridges.clone(),
                degraded,
                computed_at: Instant::now(),
            },
        );
        (bridges, degraded)
    }

    fn compute(
        &self,
        project_id: &str,
        query_vector: &[f32],
        activated: &[(String, Vec<f32>)],
        activated_ids: &HashSet<String>,
    ) -> (Vec<Bridge>, bool) {
        // Candidates come from a broad vector-store sample per level; full
        // vectors are then fetched via metadata since the vector store does
        // not expose raw vectors outside of a search call.
        let mut scored: Vec<Bridge> = Vec::new();
        let mut seen = HashSet::new();
        let mut degraded = false;
        for level in [Level::Concept, Level::Context, Level::Episode] {
            let hits = match self.vectors.search(
                project_id,
                level,
                query_vector,
                self.config.bridge_sample_cap,
                None,
            ) {
                Ok(hits) => hits,
                Err(_) => {
                    degraded = true;
                    continue;
                }
            };
            for (id, _score, _payload) in hits {
                if activated_ids.contains(&id) || !seen.insert(id.clone()) {
                    continue;
                }
                let Ok(Some(memory)) = self.metadata.get_memory(&id) else {
                    continue;
                };
                let novelty = 1.0 - cosine_similarity(query_vector, &memory.cognitive_vector);
                let connection_potential = activated
                    .iter()
                    .map(|(_, v)| cosine_similarity(&memory.cognitive_vector, v))
                    .fold(f32::MIN, f32::max);
                let bridge_score = self.config.bridge_novelty_weight * novelty
                    + self.config.bridge_connection_weight * connection_potential;
                if bridge_score >= self.config.bridge_min_score {
                    scored.push(Bridge {
                        memory,
                        novelty,
                        connection_potential,
                        bridge_score,
                    });
                }
            }
        }

        scored.sort_by(|a, b| {
            b.bridge_score
                .partial_cmp(&a.bridge_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        scored.truncate(self.config.bridge_k);
        (scored, degraded)
    }
}
