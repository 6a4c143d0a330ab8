//! End-to-end scenario tests, driven entirely through `Engine` the way a
//! real collaborator would use it.
//!
//! This crate builds `engram-core` with the `embeddings` feature off (see
//! Cargo.toml), so `store_experience`/`load_memories`/`retrieve_memories`
//! route through the deterministic hash embedder rather than a downloaded
//! model. That makes exact core/peripheral/bridge routing for free-text
//! queries unpredictable bit-for-bit, so assertions below favor shape and
//! direction (does the on-topic chunk activate, does the off-topic one
//! land only as a bridge) over exact scores. Scenario F needs precise
//! cosine control to exercise the bridge/activation boundary, so it seeds
//! `ActivationEngine`/`BridgeDiscovery` with hand-chosen vectors directly,
//! the same way the crate's own bridge module tests do.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};

use engram_core::activation::ActivationEngine;
use engram_core::bridge::BridgeDiscovery;
use engram_core::ids;
use engram_core::memory::{ConnectionType, Kind, Memory};
use engram_core::prelude::*;
use engram_core::storage::{MetadataStore, SqliteMetadataStore, UsearchVectorStore, VectorPayload, VectorStore};

const GUIDE: &str = "# Authentication\n\n\
Overview of authentication.\n\n\
## JWT\n\n\
JWT tokens expire after a fixed duration.\n\n\
## Session\n\n\
Session cookies persist server-side.\n\n\
# Performance\n\n\
## Caching\n\n\
Cache entries have a TTL too.\n";

/// Builds an in-memory engine plus direct handles to its stores, mirroring
/// the helper in `facade::tests`, but with a wider embedding dimension (to
/// cut down on hash-bucket collisions) and the raw store handles exposed so
/// tests can assert on state the facade doesn't surface.
fn engine(project_id: &str) -> (Engine, Arc<dyn MetadataStore>, Arc<dyn VectorStore>) {
    let mut config = EngineConfig::default();
    config.project_id = project_id.to_string();
    config.embedding_dimension = 64;
    config.cognitive_dimension = 80;
    let metadata: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::open_in_memory().unwrap());
    let vectors: Arc<dyn VectorStore> = Arc::new(UsearchVectorStore::new());
    for level in [Level::Concept, Level::Context, Level::Episode] {
        vectors.ensure_collection(project_id, level, 80).unwrap();
    }
    let engine = Engine::assemble(config, project_id.to_string(), metadata.clone(), vectors.clone()).unwrap();
    (engine, metadata, vectors)
}

fn sparse_vector(len: usize, a_idx: usize, a: f32, b_idx: usize, b: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; len];
    v[a_idx] = a;
    v[b_idx] = b;
    v
}

fn commit_file(dir: &Path, file_name: &str, content: &str, message: &str) -> git2::Oid {
    std::fs::write(dir.join(file_name), content).unwrap();
    let repo = git2::Repository::open(dir).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(file_name)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = git2::Signature::now("Test Author", "author@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.target()).and_then(|oid| repo.find_commit(oid).ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents).unwrap()
}

/// Scenario A — ingest + recall with core vs. peripheral classification.
#[test]
fn scenario_a_core_vs_peripheral_classification() {
    let (engine, _metadata, _vectors) = engine("scenario-a");
    let report = engine.load_memories("/docs/guide.md", GUIDE, None).unwrap();
    assert!(report.added >= 4, "the document has at least four sections");
    assert_eq!(report.failed, 0);

    let result = engine
        .retrieve_memories(
            "How do JWT tokens expire?",
            &RetrievalOptions { types: RetrievalTypes::default(), limit: 5 },
            None,
        )
        .unwrap();

    let is_jwt_chunk = |m: &Memory| {
        matches!(&m.payload, MemoryPayload::DocumentChunk { breadcrumb, .. } if breadcrumb.contains("JWT"))
    };
    let activated: Vec<&Memory> = result.core.iter().chain(result.peripheral.iter()).collect();
    assert!(!activated.is_empty(), "a query about the document's own topic should activate something");
    assert!(
        activated.iter().any(|m| is_jwt_chunk(m)),
        "the JWT chunk should be among the activated memories for a query about JWT expiry"
    );

    // a query this close to one chunk's content should not need to fall back
    // to a loosely-related bridge for the same chunk
    assert!(
        result.bridges.iter().all(|b| !is_jwt_chunk(&b.memory)),
        "the on-topic chunk should activate directly rather than surface only as a bridge"
    );
    for bridge in &result.bridges {
        assert!(bridge.bridge_score >= 0.5);
    }

    let core_ids: std::collections::HashSet<&str> = result.core.iter().map(|m| m.id.as_str()).collect();
    let peripheral_ids: std::collections::HashSet<&str> = result.peripheral.iter().map(|m| m.id.as_str()).collect();
    assert!(core_ids.is_disjoint(&peripheral_ids), "a memory cannot be both core and peripheral");
}

/// Scenario B — idempotent re-ingestion of an unchanged source.
#[test]
fn scenario_b_reload_is_idempotent_in_shape_not_identity() {
    let (engine, metadata, _vectors) = engine("scenario-b");
    let first = engine.load_memories("/docs/guide.md", GUIDE, None).unwrap();
    assert_eq!(first.failed, 0);

    let first_memories = metadata.query_by_source_path("/docs/guide.md").unwrap();
    let mut first_contents: Vec<String> = first_memories.iter().map(|m| m.content.clone()).collect();
    first_contents.sort();

    let second = engine.load_memories("/docs/guide.md", GUIDE, None).unwrap();
    assert_eq!(second.added, first.added, "reloading identical content yields the same memory count");
    assert_eq!(second.connections_added, first.connections_added);

    let second_memories = metadata.query_by_source_path("/docs/guide.md").unwrap();
    let mut second_contents: Vec<String> = second_memories.iter().map(|m| m.content.clone()).collect();
    second_contents.sort();
    assert_eq!(second_memories.len(), first_memories.len());
    assert_eq!(first_contents, second_contents, "the replacement set carries identical content");

    // Document-chunk ids are 128-bit opaque, minted fresh per insert (not a
    // content hash), and a reload is a delete-then-recreate of the whole
    // source path. So a reload is idempotent in shape (count, content, edge
    // count) but never in raw id identity; see DESIGN.md.
    let first_ids: std::collections::HashSet<&str> = first_memories.iter().map(|m| m.id.as_str()).collect();
    let second_ids: std::collections::HashSet<&str> = second_memories.iter().map(|m| m.id.as_str()).collect();
    assert!(first_ids.is_disjoint(&second_ids), "reload replaces rather than reuses ids");
}

/// Scenario C — incremental git ingestion resumes from a cursor.
#[test]
fn scenario_c_incremental_git_ingestion_resumes_from_cursor() {
    let dir = tempfile::tempdir().unwrap();
    git2::Repository::init(dir.path()).unwrap();
    commit_file(dir.path(), "a.rs", "fn a() {}\n", "feat: add a");

    let (engine, metadata, _vectors) = engine("scenario-c");
    let initial = engine.load_git_patterns(dir.path(), None).unwrap();
    assert_eq!(initial.commits_loaded, 1);
    assert_eq!(initial.commits_failed, 0);

    // two more commits land after the point a prior session would have
    // reached; one of them touches a.rs again, which should register it as
    // a hotspot.
    commit_file(dir.path(), "b.rs", "fn b() {}\n", "feat: add b");
    commit_file(dir.path(), "a.rs", "fn a() { a_impl() }\n", "fix: guard a");

    let incremental = engine.load_git_patterns(dir.path(), None).unwrap();
    assert_eq!(incremental.commits_loaded, 2, "only commits after the resume cursor are ingested");
    assert_eq!(incremental.commits_skipped, 0);

    let hotspot_id = ids::git_hotspot_id(&ids::canonicalize_path("a.rs"));
    let hotspot = metadata.get_memory(&hotspot_id).unwrap();
    assert!(hotspot.is_some(), "a.rs touched twice across the loaded history should produce a hotspot pattern");

    // The cursor is bounded by the revwalk itself: it never re-walks
    // anything at or before the last ingested commit, so a true no-op
    // re-invocation examines nothing rather than re-walking and
    // skip-counting the whole range. See DESIGN.md.
    let replay = engine.load_git_patterns(dir.path(), None).unwrap();
    assert_eq!(replay.commits_loaded, 0);
    assert_eq!(replay.commits_skipped, 0);

    assert!(metadata.most_recent_commit_sha("scenario-c").unwrap().is_some());
}

/// Scenario D — deletion cascades through the connection graph.
#[test]
fn scenario_d_deletion_cascades_through_the_graph() {
    let (engine, metadata, _vectors) = engine("scenario-d");
    let m = engine.store_experience("memory M", &StoreOptions::default()).unwrap();
    let x = engine.store_experience("memory X", &StoreOptions::default()).unwrap();
    let y = engine.store_experience("memory Y", &StoreOptions::default()).unwrap();

    let graph = engine.connection_graph();
    graph.upsert_edge(&m.id, &x.id, ConnectionType::Associative, 0.7).unwrap();
    graph.upsert_edge(&y.id, &m.id, ConnectionType::Hierarchical, 1.0).unwrap();

    let before = graph.neighbors(&y.id, 0.0, None).unwrap();
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].0, m.id);

    let result = engine.delete_memory_by_id(&m.id).unwrap();
    assert_eq!(result.deleted, 1);
    assert_eq!(result.vector_failures, 0);

    assert!(metadata.get_memory(&m.id).unwrap().is_none());

    let after = graph.neighbors(&y.id, 0.0, None).unwrap();
    assert!(after.is_empty(), "the edge into the deleted memory should cascade away with it");

    let retrieved = engine
        .retrieve_memories("memory", &RetrievalOptions::default(), None)
        .unwrap();
    assert!(
        retrieved
            .core
            .iter()
            .chain(retrieved.peripheral.iter())
            .chain(retrieved.bridges.iter().map(|b| &b.memory))
            .all(|mem| mem.id != m.id),
        "a deleted memory should never resurface through retrieval"
    );
}

/// Scenario E — consolidation promotes a well-rehearsed episodic memory.
#[test]
fn scenario_e_decay_then_consolidation_promotes_to_semantic() {
    let (engine, metadata, _vectors) = engine("scenario-e");

    let mut m = Memory::new_episodic(
        "scenario-e",
        Level::Episode,
        "JWT sessions are revoked on password change",
        vec![0.2; 80],
        [0.0; 16],
    );
    m.access_count = 12;
    m.created_at = Utc::now() - ChronoDuration::days(7);
    metadata.create_memory(&m).unwrap();

    let report = engine.consolidate_memories(false, None).unwrap();
    assert_eq!(report.promoted, 1);
    assert_eq!(report.expired, 0);

    let semantic_pool = metadata.list_by_kind("scenario-e", Kind::Semantic).unwrap();
    assert_eq!(semantic_pool.len(), 1);
    let promoted = semantic_pool[0].clone();
    assert_eq!(promoted.content, m.content);
    assert_eq!(promoted.kind, Kind::Semantic);

    let neighbors = metadata.get_neighbors(&m.id, 0.0).unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].0, promoted.id);
    assert!(neighbors[0].2 >= 0.5, "an access count this high should cross the scenario's strength floor");

    // the promoted memory should carry the slower semantic decay rate, not
    // the episodic one it started with.
    let config = EngineConfig::default();
    let activity = Arc::new(engram_core::activity::ActivityTracker::new(config.clone(), metadata.clone()));
    let dual_store = engram_core::lifecycle::DualMemoryStore::new(config, metadata.clone(), _vectors.clone(), activity);

    let mut aged_episodic = m.clone();
    aged_episodic.created_at = Utc::now() - ChronoDuration::days(30);
    let mut aged_semantic = promoted.clone();
    aged_semantic.created_at = Utc::now() - ChronoDuration::days(30);

    assert!(
        dual_store.effective_strength(&aged_semantic) > dual_store.effective_strength(&aged_episodic),
        "the semantic decay rate is an order of magnitude slower than the episodic one"
    );
}

/// Scenario F — a distant-but-connected memory surfaces only as a bridge.
#[test]
fn scenario_f_distant_high_connection_memory_surfaces_only_as_bridge() {
    let (_engine, metadata, vectors) = engine("scenario-f");
    let config = EngineConfig::default();

    let query_vector = sparse_vector(80, 0, 1.0, 1, 0.0);
    let auth_vector = sparse_vector(80, 0, 0.8, 1, 0.6);
    let cache_vector = sparse_vector(80, 0, 0.1, 1, 0.9);

    let auth = Memory::new_episodic("scenario-f", Level::Concept, "Authentication cluster: JWT session validation", auth_vector.clone(), [0.0; 16]);
    metadata.create_memory(&auth).unwrap();
    vectors.upsert("scenario-f", Level::Concept, &auth.id, &auth_vector, VectorPayload::default()).unwrap();

    let cache = Memory::new_episodic("scenario-f", Level::Concept, "Cache entry TTL expiration", cache_vector.clone(), [0.0; 16]);
    metadata.create_memory(&cache).unwrap();
    vectors.upsert("scenario-f", Level::Concept, &cache.id, &cache_vector, VectorPayload::default()).unwrap();

    let activation_engine = ActivationEngine::new(config.clone(), vectors.clone(), metadata.clone());
    let activation = activation_engine.activate("scenario-f", &query_vector);
    assert!(
        activation.activated_ids().contains(&auth.id),
        "the near-query memory should seed the activation"
    );
    assert!(
        !activation.activated_ids().contains(&cache.id),
        "the distant memory should not activate directly from the query"
    );

    let bridge_discovery = BridgeDiscovery::new(config, vectors.clone(), metadata.clone());
    let activated_vectors: Vec<(String, Vec<f32>)> = activation
        .core
        .iter()
        .chain(activation.peripheral.iter())
        .map(|mem| (mem.id.clone(), mem.cognitive_vector.clone()))
        .collect();
    let (bridges, degraded) = bridge_discovery.discover("scenario-f", &query_vector, &activated_vectors);
    assert!(!degraded);

    let hit = bridges
        .iter()
        .find(|b| b.memory.id == cache.id)
        .expect("the cache-TTL memory should surface through bridge discovery");
    assert!(hit.novelty >= 0.5, "novelty should be high given its low cosine to the query");
    assert!(hit.connection_potential >= 0.5, "connection potential should be high given its cosine to the activated memory");
    assert!(!activation.core.iter().any(|mem| mem.id == cache.id));
    assert!(!activation.peripheral.iter().any(|mem| mem.id == cache.id));
}
