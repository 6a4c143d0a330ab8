//! Engine configuration
//!
//! Loaded once into an immutable value and passed by reference into every
//! component at construction. No globals are mutated at runtime other than
//! the two process-local caches (bridge cache, activity cache), per the
//! design notes.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Recognized, defaulted configuration for the whole engine (spec §6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct EngineConfig {
    /// Namespace key. Derived from `repo_path` (§6.3) if left empty.
    pub project_id: String,
    /// Filesystem root for per-project metadata/vector state.
    pub data_dir: PathBuf,
    /// Filesystem root for embedding model artifacts.
    pub models_dir: PathBuf,

    /// Semantic embedding width (`D_sem`).
    pub embedding_dimension: usize,
    /// Fused cognitive vector width. Defaults to `embedding_dimension + 16`.
    pub cognitive_dimension: usize,

    /// Activation thresholds (§4.8).
    pub activation_threshold: f32,
    pub peripheral_threshold: f32,
    pub core_threshold: f32,
    pub max_activations: usize,
    pub max_depth: u32,
    pub spread_threshold: f32,
    pub hop_decay: f32,
    pub seed_k: usize,

    /// Bridge discovery (§4.9).
    pub bridge_k: usize,
    pub bridge_novelty_weight: f32,
    pub bridge_connection_weight: f32,
    pub bridge_min_score: f32,
    pub bridge_sample_cap: usize,
    pub bridge_cache_ttl_secs: u64,

    /// Decay and consolidation (§4.7).
    pub decay_episodic_per_day: f64,
    pub decay_semantic_per_day: f64,
    pub max_episodic_age_days: i64,
    pub min_retention_strength: f64,
    pub importance_floor: f64,
    pub content_decay_tag_profiles: HashMap<String, f64>,
    pub content_decay_level_profiles: HashMap<i32, f64>,
    pub consolidation_access_threshold: i64,
    pub consolidation_min_age_days: i64,
    pub consolidation_strength_threshold: f64,

    /// Activity tracking (§4.13).
    pub activity_window_days: i64,
    pub max_commits_per_day: f64,
    pub max_accesses_per_day: f64,
    pub activity_commit_weight: f64,
    pub activity_access_weight: f64,
    pub activity_cache_ttl_secs: u64,

    /// Ingestion (§4.11, §4.12).
    pub ingest_chunk_token_budget: usize,
    pub ingest_sequential_edge_strength: f32,
    pub ingest_associative_threshold: f32,
    pub ingest_alpha_cosine: f32,
    pub ingest_beta_lexical: f32,
    pub ingest_gamma_structural: f32,
    pub max_commits_per_load: usize,
    pub ingest_atomicity: IngestAtomicity,

    /// Embedding batching.
    pub embedding_batch_size: usize,
}

/// Open Question resolution (spec §9): whether a document ingest commits
/// per chunk or requires the whole file to succeed atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestAtomicity {
    /// Each chunk is its own subtransaction; failures are counted, not raised.
    PerChunk,
    /// The whole file succeeds or fails as one transaction.
    PerFile,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut content_decay_tag_profiles = HashMap::new();
        content_decay_tag_profiles.insert("architectural_decision".to_string(), 0.1);
        content_decay_tag_profiles.insert("session_lesson".to_string(), 0.3);
        content_decay_tag_profiles.insert("git_commit".to_string(), 0.5);
        content_decay_tag_profiles.insert("bug_fix".to_string(), 2.0);
        content_decay_tag_profiles.insert("implementation".to_string(), 1.5);
        content_decay_tag_profiles.insert("documentation".to_string(), 0.7);
        content_decay_tag_profiles.insert("exploration".to_string(), 1.8);

        let mut content_decay_level_profiles = HashMap::new();
        content_decay_level_profiles.insert(0, 0.2);
        content_decay_level_profiles.insert(1, 0.8);
        content_decay_level_profiles.insert(2, 1.0);

        Self {
            project_id: String::new(),
            data_dir: default_data_dir(),
            models_dir: default_models_dir(),

            embedding_dimension: 384,
            cognitive_dimension: 384 + 16,

            activation_threshold: 0.7,
            peripheral_threshold: 0.4,
            core_threshold: 0.7,
            max_activations: 50,
            max_depth: 3,
            spread_threshold: 0.6,
            hop_decay: 0.8,
            seed_k: 10,

            bridge_k: 5,
            bridge_novelty_weight: 0.6,
            bridge_connection_weight: 0.4,
            bridge_min_score: 0.5,
            bridge_sample_cap: 1000,
            bridge_cache_ttl_secs: 300,

            decay_episodic_per_day: 0.1,
            decay_semantic_per_day: 0.01,
            max_episodic_age_days: 30,
            min_retention_strength: 0.05,
            importance_floor: 0.0,
            content_decay_tag_profiles,
            content_decay_level_profiles,
            consolidation_access_threshold: 10,
            consolidation_min_age_days: 3,
            consolidation_strength_threshold: 0.3,

            activity_window_days: 30,
            max_commits_per_day: 20.0,
            max_accesses_per_day: 200.0,
            activity_commit_weight: 0.6,
            activity_access_weight: 0.4,
            activity_cache_ttl_secs: 300,

            ingest_chunk_token_budget: 400,
            ingest_sequential_edge_strength: 0.7,
            ingest_associative_threshold: 0.55,
            ingest_alpha_cosine: 0.6,
            ingest_beta_lexical: 0.25,
            ingest_gamma_structural: 0.15,
            max_commits_per_load: 1000,
            ingest_atomicity: IngestAtomicity::PerChunk,

            embedding_batch_size: 32,
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "engram", "core")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".engram/data"))
}

fn default_models_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "engram", "core")
        .map(|d| d.cache_dir().join("models"))
        .unwrap_or_else(|| PathBuf::from(".engram/models"))
}

impl EngineConfig {
    /// Load a config, overlaying any fields present in the TOML file at
    /// `path` on top of [`EngineConfig::default`].
    pub fn load_overlay(path: &std::path::Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(cfg)
    }

    /// The multiplier for a given set of tags and hierarchy level, resolved
    /// by priority: explicit tag match > hierarchy-level default > 1.0
    /// (spec §4.7).
    pub fn content_profile_multiplier(&self, tags: &[String], level: i32) -> f64 {
        for tag in tags {
            if let Some(m) = self.content_decay_tag_profiles.get(tag) {
                return *m;
            }
        }
        self.content_decay_level_profiles
            .get(&level)
            .copied()
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cognitive_dimension_is_sem_plus_16() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.cognitive_dimension, cfg.embedding_dimension + 16);
    }

    #[test]
    fn content_profile_multiplier_prefers_tag_over_level() {
        let cfg = EngineConfig::default();
        let m = cfg.content_profile_multiplier(&["bug_fix".to_string()], 0);
        assert_eq!(m, 2.0);
    }

    #[test]
    fn content_profile_multiplier_falls_back_to_level() {
        let cfg = EngineConfig::default();
        let m = cfg.content_profile_multiplier(&[], 0);
        assert_eq!(m, 0.2);
    }

    #[test]
    fn content_profile_multiplier_defaults_to_one() {
        let cfg = EngineConfig::default();
        let m = cfg.content_profile_multiplier(&["unknown_tag".to_string()], 7);
        assert_eq!(m, 1.0);
    }
}
