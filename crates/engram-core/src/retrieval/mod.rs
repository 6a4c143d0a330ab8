//! RetrievalCoordinator — composes activation + bridge discovery (spec §4.10)

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::activation::ActivationEngine;
use crate::bridge::{Bridge, BridgeDiscovery};
use crate::encoder::CognitiveEncoder;
use crate::error::{check_deadline, deadline_elapsed, EngineError, OperationStatus, Result};
use crate::memory::{Memory, RetrievalClass};
use crate::storage::MetadataStore;

/// Which result buckets a caller wants populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalTypes {
    pub core: bool,
    pub peripheral: bool,
    pub bridge: bool,
}

impl Default for RetrievalTypes {
    fn default() -> Self {
        Self {
            core: true,
            peripheral: true,
            bridge: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    pub types: RetrievalTypes,
    pub limit: usize,
}

/// Per-step wall-clock timings for a single `retrieve` call (spec §4.10 step 6).
#[derive(Debug, Clone, Default)]
pub struct RetrievalTimings {
    pub encode: Duration,
    pub activation: Duration,
    pub bridge: Duration,
    pub total: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub core: Vec<Memory>,
    pub peripheral: Vec<Memory>,
    pub bridges: Vec<Bridge>,
    pub timings: RetrievalTimings,
    pub status: OperationStatus,
    pub causes: Vec<String>,
}

pub struct RetrievalCoordinator {
    encoder: Arc<CognitiveEncoder>,
    activation: Arc<ActivationEngine>,
    bridge: Arc<BridgeDiscovery>,
    metadata: Arc<dyn MetadataStore>,
}

impl RetrievalCoordinator {
    pub fn new(
        encoder: Arc<CognitiveEncoder>,
        activation: Arc<ActivationEngine>,
        bridge: Arc<BridgeDiscovery>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            encoder,
            activation,
            bridge,
            metadata,
        }
    }

    pub fn retrieve(
        &self,
        project_id: &str,
        query_text: &str,
        options: &RetrievalOptions,
        deadline: Option<Instant>,
    ) -> Result<RetrievalResult> {
        let call_start = Instant::now();
        check_deadline(deadline)?;
        if query_text.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "query text cannot be empty".to_string(),
            ));
        }

        let encode_start = Instant::now();
        let encoded = self.encoder.encode(query_text)?;
        let encode_elapsed = encode_start.elapsed();

        let activation_start = Instant::now();
        let activation = self.activation.activate(project_id, &encoded.vector);
        let activation_elapsed = activation_start.elapsed();
        let mut degraded = activation.degraded;

        let limit = if options.limit == 0 {
            usize::MAX
        } else {
            options.limit
        };

        let mut bridge_elapsed = Duration::default();
        let mut bridges = Vec::new();
        let timed_out = deadline_elapsed(deadline);
        if options.types.bridge && !timed_out {
            let bridge_start = Instant::now();
            let activated_vectors: Vec<(String, Vec<f32>)> = activation
                .core
                .iter()
                .chain(activation.peripheral.iter())
                .map(|m| (m.id.clone(), m.cognitive_vector.clone()))
                .collect();
            let (discovered, bridge_degraded) =
                self.bridge
                    .discover(project_id, &encoded.vector, &activated_vectors);
            bridges = discovered;
            degraded = degraded || bridge_degraded;
            bridge_elapsed = bridge_start.elapsed();

            let core_peripheral_ids: HashSet<&str> = activation
                .core
                .iter()
                .chain(activation.peripheral.iter())
                .map(|m| m.id.as_str())
                .collect();
            bridges.retain(|b| !core_peripheral_ids.contains(b.memory.id.as_str()));
            bridges.truncate(limit);
        }

        let mut core = activation.core;
        core.truncate(limit);
        let mut peripheral = activation.peripheral;
        peripheral.truncate(limit);

        if !options.types.core {
            core.clear();
        }
        if !options.types.peripheral {
            peripheral.clear();
        }

        let now = Utc::now();
        for memory in &core {
            let _ = self
                .metadata
                .record_access(&memory.id, RetrievalClass::Core, now);
        }
        for memory in &peripheral {
            let _ = self
                .metadata
                .record_access(&memory.id, RetrievalClass::Peripheral, now);
        }
        for bridge in &bridges {
            let _ = self
                .metadata
                .record_access(&bridge.memory.id, RetrievalClass::Bridge, now);
        }

        let mut causes = Vec::new();
        if timed_out {
            causes.push("deadline exceeded before bridge discovery; bridges skipped".to_string());
        }
        if degraded {
            causes.push("activation or bridge search degraded to a partial result".to_string());
        }
        let status = if timed_out || degraded {
            OperationStatus::Partial
        } else {
            OperationStatus::Ok
        };

        Ok(RetrievalResult {
            core,
            peripheral,
            bridges,
            timings: RetrievalTimings {
                encode: encode_elapsed,
                activation: activation_elapsed,
                bridge: bridge_elapsed,
                total: call_start.elapsed(),
            },
            status,
            causes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationEngine;
    use crate::config::EngineConfig;
    use crate::dimensions::RuleBasedDimensionExtractor;
    use crate::embeddings::DeterministicEmbeddingProvider;
    use crate::memory::Level;
    use crate::storage::{MetadataStore, SqliteMetadataStore, UsearchVectorStore, VectorStore};

    fn coordinator() -> (RetrievalCoordinator, Arc<dyn MetadataStore>, Arc<dyn VectorStore>) {
        let mut config = EngineConfig::default();
        config.embedding_dimension = 4;
        config.cognitive_dimension = 20;
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteMetadataStore::open_in_memory().unwrap());
        let vectors: Arc<dyn VectorStore> = Arc::new(UsearchVectorStore::new());
        for level in [Level::Concept, Level::Context, Level::Episode] {
            vectors.ensure_collection("proj", level, 20).unwrap();
        }
        let encoder = Arc::new(CognitiveEncoder::new(
            Box::new(DeterministicEmbeddingProvider::new(4)),
            Box::new(RuleBasedDimensionExtractor::new()),
        ));
        let activation = Arc::new(ActivationEngine::new(
            config.clone(),
            vectors.clone(),
            metadata.clone(),
        ));
        let bridge = Arc::new(BridgeDiscovery::new(config, vectors.clone(), metadata.clone()));
        let coordinator =
            RetrievalCoordinator::new(encoder, activation, bridge, metadata.clone());
        (coordinator, metadata, vectors)
    }

    #[test]
    fn empty_query_is_rejected() {
        let (coordinator, _m, _v) = coordinator();
        let err = coordinator
            .retrieve("proj", "   ", &RetrievalOptions::default(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn retrieval_records_access_events() {
        let (coordinator, metadata, vectors) = coordinator();
        let encoder = CognitiveEncoder::new(
            Box::new(DeterministicEmbeddingProvider::new(4)),
            Box::new(RuleBasedDimensionExtractor::new()),
        );
        let encoded = encoder.encode("authentication jwt tokens").unwrap();
        let mut m = Memory::new_episodic(
            "proj",
            Level::Concept,
            "authentication jwt tokens",
            encoded.vector.clone(),
            encoded.dimensions,
        );
        m.id = "auth-jwt".to_string();
        metadata.create_memory(&m).unwrap();
        vectors
            .upsert("proj", Level::Concept, "auth-jwt", &encoded.vector, Default::default())
            .unwrap();

        let result = coordinator
            .retrieve("proj", "authentication jwt tokens", &RetrievalOptions::default(), None)
            .unwrap();
        assert!(!result.core.is_empty());
        let fetched = metadata.get_memory("auth-jwt").unwrap().unwrap();
        assert_eq!(fetched.access_count, 1);
    }
}
