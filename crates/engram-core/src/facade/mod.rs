//! Engine — the sole external boundary (spec §4.14, §6.1)
//!
//! Every other module is reachable only through here. Collaborators
//! translate their own wire format into these nine calls; nothing in the
//! crate bypasses this facade to talk to storage directly.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::activation::ActivationEngine;
use crate::activity::ActivityTracker;
use crate::bridge::BridgeDiscovery;
use crate::config::EngineConfig;
use crate::dimensions::{DimensionExtractor, RuleBasedDimensionExtractor};
use crate::embeddings::EmbeddingProvider;
use crate::encoder::CognitiveEncoder;
use crate::error::{EngineError, OperationStatus, Result};
use crate::ingest::document::{DocumentLoadReport, MarkdownLoader};
use crate::ingest::git::{GitIngestReport, GitPatternLoader};
use crate::lifecycle::{ConsolidationReport, DualMemoryStore};
use crate::memory::{Kind, Level, Memory, MemoryPayload};
use crate::retrieval::{RetrievalCoordinator, RetrievalOptions, RetrievalResult};
use crate::storage::{ConnectionGraph, MetadataStore, SqliteMetadataStore, UsearchVectorStore, VectorPayload, VectorStore};

/// Options for a `store_experience` call (spec §4.14).
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub hierarchy_level: Option<Level>,
    pub importance: Option<f64>,
    pub tags: Vec<String>,
    pub context: Option<String>,
}

/// Outcome of `store_experience`.
#[derive(Debug, Clone)]
pub struct StoreResult {
    pub id: String,
}

/// Outcome shared by the three delete operations.
#[derive(Debug, Clone, Default)]
pub struct DeleteResult {
    pub deleted: usize,
    pub vector_failures: usize,
    pub status: OperationStatus,
    pub causes: Vec<String>,
}

/// Aggregate counts returned by `status` (spec §4.14).
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub episodic_count: usize,
    pub semantic_count: usize,
    pub concept_count: usize,
    pub context_count: usize,
    pub episode_count: usize,
    pub recent_access_count: i64,
    pub recent_commit_count: i64,
    pub status: OperationStatus,
    pub causes: Vec<String>,
}

/// Composes every subsystem behind the nine facade operations.
pub struct Engine {
    config: EngineConfig,
    project_id: String,
    metadata: Arc<dyn MetadataStore>,
    vectors: Arc<dyn VectorStore>,
    encoder: Arc<CognitiveEncoder>,
    retrieval: RetrievalCoordinator,
    lifecycle: DualMemoryStore,
    markdown: MarkdownLoader,
    git: GitPatternLoader,
}

impl Engine {
    /// Open (creating if absent) the per-project metadata/vector state under
    /// `config.data_dir` and wire up every component (spec §6.2).
    pub fn open(config: EngineConfig) -> Result<Self> {
        let project_id = config.project_id.clone();
        if project_id.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "project_id must not be empty".to_string(),
            ));
        }

        let db_path = config.data_dir.join(&project_id).join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::open(&db_path)?);
        let vectors: Arc<dyn VectorStore> = Arc::new(UsearchVectorStore::new());
        for level in [Level::Concept, Level::Context, Level::Episode] {
            vectors.ensure_collection(&project_id, level, config.cognitive_dimension)?;
        }

        Self::assemble(config, project_id, metadata, vectors)
    }

    /// Assemble from pre-built stores (used by `open` and by tests wanting
    /// an in-memory engine).
    pub fn assemble(
        config: EngineConfig,
        project_id: String,
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let embedder: Box<dyn EmbeddingProvider> = default_embedder(&config);
        let dimension_extractor: Box<dyn DimensionExtractor> =
            Box::new(RuleBasedDimensionExtractor::new());
        let encoder = Arc::new(CognitiveEncoder::new(embedder, dimension_extractor));

        let activation = Arc::new(ActivationEngine::new(
            config.clone(),
            vectors.clone(),
            metadata.clone(),
        ));
        let bridge = Arc::new(BridgeDiscovery::new(
            config.clone(),
            vectors.clone(),
            metadata.clone(),
        ));
        let retrieval = RetrievalCoordinator::new(
            encoder.clone(),
            activation,
            bridge,
            metadata.clone(),
        );

        let activity = Arc::new(ActivityTracker::new(config.clone(), metadata.clone()));
        let lifecycle = DualMemoryStore::new(
            config.clone(),
            metadata.clone(),
            vectors.clone(),
            activity,
        );

        let markdown = MarkdownLoader::new(
            config.clone(),
            encoder.clone(),
            metadata.clone(),
            vectors.clone(),
        );
        let git = GitPatternLoader::new(
            config.clone(),
            encoder.clone(),
            metadata.clone(),
            vectors.clone(),
        );

        Ok(Self {
            config,
            project_id,
            metadata,
            vectors,
            encoder,
            retrieval,
            lifecycle,
            markdown,
            git,
        })
    }

    /// Store an explicit experience (spec §4.14).
    pub fn store_experience(&self, text: &str, options: &StoreOptions) -> Result<StoreResult> {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "text cannot be empty".to_string(),
            ));
        }
        let encoded = self.encoder.encode(text)?;
        let level = options.hierarchy_level.unwrap_or(Level::Episode);
        let mut memory = Memory::new_episodic(
            self.project_id.clone(),
            level,
            text,
            encoded.vector.clone(),
            encoded.dimensions,
        );
        memory.importance = options.importance.unwrap_or(0.0).clamp(0.0, 1.0);
        memory.tags = options.tags.iter().cloned().collect();
        memory.payload = MemoryPayload::Generic;
        if let Some(context) = &options.context {
            memory.source_path = Some(context.clone());
        }

        self.metadata.create_memory(&memory)?;
        self.vectors.ensure_collection(&self.project_id, level, encoded.vector.len())?;
        self.vectors.upsert(
            &self.project_id,
            level,
            &memory.id,
            &encoded.vector,
            VectorPayload {
                tags: memory.tags.iter().cloned().collect(),
            },
        )?;

        Ok(StoreResult { id: memory.id })
    }

    /// Retrieve memories for `query` via the activation + bridge pipeline
    /// (spec §4.14, §4.10).
    pub fn retrieve_memories(
        &self,
        query: &str,
        options: &RetrievalOptions,
        deadline: Option<Instant>,
    ) -> Result<RetrievalResult> {
        self.retrieval
            .retrieve(&self.project_id, query, options, deadline)
    }

    /// Ingest a structured document (spec §4.11, §4.14).
    pub fn load_memories(
        &self,
        source_path: &str,
        text: &str,
        deadline: Option<Instant>,
    ) -> Result<DocumentLoadReport> {
        if !MarkdownLoader::claims(source_path) {
            return Err(EngineError::InvalidSource(format!(
                "no loader claims path: {source_path}"
            )));
        }
        self.markdown
            .load(&self.project_id, source_path, text, deadline)
    }

    /// Incrementally ingest commit history from `repo_path` (spec §4.12, §4.14).
    pub fn load_git_patterns(
        &self,
        repo_path: &Path,
        deadline: Option<Instant>,
    ) -> Result<GitIngestReport> {
        Ok(self.git.load(&self.project_id, repo_path, deadline)?)
    }

    /// Run a consolidation pass (spec §4.7, §4.14).
    pub fn consolidate_memories(
        &self,
        dry_run: bool,
        deadline: Option<Instant>,
    ) -> Result<ConsolidationReport> {
        self.lifecycle
            .consolidate(&self.project_id, dry_run, deadline)
    }

    /// Aggregate counts for the project (spec §4.14).
    pub fn status(&self) -> Result<StatusReport> {
        let episodic = self.metadata.list_by_kind(&self.project_id, Kind::Episodic)?;
        let semantic = self.metadata.list_by_kind(&self.project_id, Kind::Semantic)?;

        let mut report = StatusReport {
            episodic_count: episodic.len(),
            semantic_count: semantic.len(),
            ..StatusReport::default()
        };
        for memory in episodic.iter().chain(semantic.iter()) {
            match memory.level {
                Level::Concept => report.concept_count += 1,
                Level::Context => report.context_count += 1,
                Level::Episode => report.episode_count += 1,
            }
        }

        match self
            .metadata
            .query_activity_window(chrono::Duration::days(self.config.activity_window_days))
        {
            Ok(stats) => {
                report.recent_access_count = stats.access_count;
                report.recent_commit_count = stats.commit_count;
            }
            Err(e) => {
                report.status = OperationStatus::Partial;
                report
                    .causes
                    .push(format!("activity window query failed: {e}"));
            }
        }

        Ok(report)
    }

    /// Delete a single memory and its vector entry (spec §4.14).
    pub fn delete_memory_by_id(&self, id: &str) -> Result<DeleteResult> {
        let memory = self.metadata.get_memory(id)?;
        let deleted = self.metadata.delete_memory(id)?;
        let mut vector_failures = 0;
        if deleted {
            if let Some(memory) = memory {
                if self
                    .vectors
                    .delete(&self.project_id, memory.level, &[id.to_string()])
                    .is_err()
                {
                    vector_failures += 1;
                }
            }
        }
        let mut causes = Vec::new();
        if vector_failures > 0 {
            causes.push(format!("{vector_failures} vector deletion(s) failed"));
        }
        Ok(DeleteResult {
            deleted: if deleted { 1 } else { 0 },
            vector_failures,
            status: if vector_failures > 0 {
                OperationStatus::Partial
            } else {
                OperationStatus::Ok
            },
            causes,
        })
    }

    /// Delete every memory carrying any of `tags` (spec §4.14).
    pub fn delete_memories_by_tags(&self, tags: &[String], dry_run: bool) -> Result<DeleteResult> {
        let matching = self.metadata.query_by_tags(tags)?;
        if dry_run {
            return Ok(DeleteResult {
                deleted: matching.len(),
                vector_failures: 0,
                status: OperationStatus::Ok,
                causes: Vec::new(),
            });
        }

        let mut vector_failures = 0;
        for memory in &matching {
            if self
                .vectors
                .delete(&self.project_id, memory.level, &[memory.id.clone()])
                .is_err()
            {
                vector_failures += 1;
            }
        }
        let deleted = self.metadata.delete_by_tags(tags)?;
        let mut causes = Vec::new();
        if vector_failures > 0 {
            causes.push(format!("{vector_failures} vector deletion(s) failed"));
        }
        Ok(DeleteResult {
            deleted,
            vector_failures,
            status: if vector_failures > 0 {
                OperationStatus::Partial
            } else {
                OperationStatus::Ok
            },
            causes,
        })
    }

    /// Delete every memory ingested from `path` (spec §4.11, §4.14).
    pub fn delete_memories_by_source_path(&self, path: &str) -> Result<DeleteResult> {
        let canonical = crate::ids::canonicalize_path(path);
        let matching = self.metadata.query_by_source_path(&canonical)?;

        let mut vector_failures = 0;
        for memory in &matching {
            if self
                .vectors
                .delete(&self.project_id, memory.level, &[memory.id.clone()])
                .is_err()
            {
                vector_failures += 1;
            }
        }
        let deleted = self.metadata.delete_by_source_path(&canonical)?;
        let mut causes = Vec::new();
        if vector_failures > 0 {
            causes.push(format!("{vector_failures} vector deletion(s) failed"));
        }
        Ok(DeleteResult {
            deleted,
            vector_failures,
            status: if vector_failures > 0 {
                OperationStatus::Partial
            } else {
                OperationStatus::Ok
            },
            causes,
        })
    }

    /// Read-only access to the connection graph, for collaborators that need
    /// to inspect adjacency without going through `retrieve_memories`.
    pub fn connection_graph(&self) -> ConnectionGraph {
        ConnectionGraph::new(self.metadata.clone())
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

#[cfg(feature = "embeddings")]
fn default_embedder(config: &EngineConfig) -> Box<dyn EmbeddingProvider> {
    Box::new(crate::embeddings::LocalEmbeddingProvider::with_models_dir(
        config.models_dir.clone(),
    ))
}

#[cfg(not(feature = "embeddings"))]
fn default_embedder(config: &EngineConfig) -> Box<dyn EmbeddingProvider> {
    Box::new(crate::embeddings::DeterministicEmbeddingProvider::new(
        config.embedding_dimension,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn engine(project_id: &str) -> Engine {
        let mut config = EngineConfig::default();
        config.project_id = project_id.to_string();
        config.embedding_dimension = 8;
        config.cognitive_dimension = 24;
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteMetadataStore::open_in_memory().unwrap());
        let vectors: Arc<dyn VectorStore> = Arc::new(UsearchVectorStore::new());
        for level in [Level::Concept, Level::Context, Level::Episode] {
            vectors.ensure_collection(project_id, level, 24).unwrap();
        }
        Engine::assemble(config, project_id.to_string(), metadata, vectors).unwrap()
    }

    #[test]
    fn store_then_retrieve_round_trips() {
        let engine = engine("proj-store");
        let stored = engine
            .store_experience("authentication jwt tokens expire", &StoreOptions::default())
            .unwrap();
        assert!(!stored.id.is_empty());

        let result = engine
            .retrieve_memories(
                "authentication jwt tokens expire",
                &RetrievalOptions::default(),
                None,
            )
            .unwrap();
        assert!(!result.core.is_empty());
    }

    #[test]
    fn store_experience_rejects_empty_text() {
        let engine = engine("proj-empty");
        let err = engine
            .store_experience("   ", &StoreOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn delete_memory_by_id_removes_it() {
        let engine = engine("proj-delete");
        let stored = engine
            .store_experience("a lesson worth keeping", &StoreOptions::default())
            .unwrap();
        let result = engine.delete_memory_by_id(&stored.id).unwrap();
        assert_eq!(result.deleted, 1);
        assert!(engine.metadata.get_memory(&stored.id).unwrap().is_none());
    }

    #[test]
    fn delete_memories_by_tags_dry_run_does_not_mutate() {
        let engine = engine("proj-tags");
        let mut opts = StoreOptions::default();
        opts.tags = vec!["scratch".to_string()];
        engine.store_experience("temp note", &opts).unwrap();

        let result = engine
            .delete_memories_by_tags(&["scratch".to_string()], true)
            .unwrap();
        assert_eq!(result.deleted, 1);
        assert_eq!(
            engine
                .metadata
                .query_by_tags(&["scratch".to_string()])
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn status_reports_counts_by_level() {
        let engine = engine("proj-status");
        engine
            .store_experience("episode one", &StoreOptions::default())
            .unwrap();
        let status = engine.status().unwrap();
        assert_eq!(status.episodic_count, 1);
        assert_eq!(status.episode_count, 1);
    }

    #[test]
    fn load_memories_rejects_non_markdown_path() {
        let engine = engine("proj-loader");
        let err = engine.load_memories("notes.txt", "# hi", None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSource(_)));
    }
}
