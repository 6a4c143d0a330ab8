//! DualMemoryStore — decay, consolidation, expiry (spec §4.7)

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::activity::ActivityTracker;
use crate::config::EngineConfig;
use crate::error::{check_deadline, deadline_elapsed, OperationStatus, Result};
use crate::memory::{ConnectionType, Kind, Level, Memory};
use crate::storage::{MetadataStore, VectorStore};

/// Outcome of a single `consolidate` pass.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    pub promoted: usize,
    pub strengthened: usize,
    pub expired: usize,
    pub connections_added: usize,
    pub status: OperationStatus,
    pub causes: Vec<String>,
}

pub struct DualMemoryStore {
    config: EngineConfig,
    metadata: Arc<dyn MetadataStore>,
    vectors: Arc<dyn VectorStore>,
    activity: Arc<ActivityTracker>,
}

impl DualMemoryStore {
    pub fn new(
        config: EngineConfig,
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorStore>,
        activity: Arc<ActivityTracker>,
    ) -> Self {
        Self {
            config,
            metadata,
            vectors,
            activity,
        }
    }

    fn base_decay_rate(&self, kind: Kind) -> f64 {
        match kind {
            Kind::Episodic => self.config.decay_episodic_per_day,
            Kind::Semantic => self.config.decay_semantic_per_day,
        }
    }

    /// Effective retention strength for `memory` evaluated now (spec §4.7).
    /// `importance_floor` raises the decay asymptote in proportion to the
    /// memory's own `importance`, so a highly important memory never decays
    /// below roughly its importance value.
    pub fn effective_strength(&self, memory: &Memory) -> f64 {
        let activity_multiplier = self.activity.current_multiplier();
        let tags: Vec<String> = memory.tags.iter().cloned().collect();
        let content_multiplier = self
            .config
            .content_profile_multiplier(&tags, memory.level as i32);
        let effective_rate =
            self.base_decay_rate(memory.kind) * activity_multiplier * content_multiplier;

        let elapsed_hours = (Utc::now() - memory.created_at).num_seconds() as f64 / 3600.0;
        let floor = (self.config.importance_floor
            + memory.importance.clamp(0.0, 1.0) * (1.0 - self.config.importance_floor))
            .clamp(0.0, 1.0);
        let raw = floor + (1.0 - floor) * (-effective_rate * elapsed_hours / 24.0).exp();
        raw.clamp(0.0, 1.0)
    }

    fn canonical_content_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.trim().to_lowercase().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Consolidation pass: promote sufficiently strong, sufficiently
    /// accessed episodic memories into semantic memories (spec §4.7).
    /// Idempotent — re-running with no new eligible memories is a no-op.
    pub fn consolidate(
        &self,
        project_id: &str,
        dry_run: bool,
        deadline: Option<Instant>,
    ) -> Result<ConsolidationReport> {
        check_deadline(deadline)?;

        let mut report = ConsolidationReport::default();
        let semantic_pool = self.metadata.list_by_kind(project_id, Kind::Semantic)?;
        let candidates = self.select_consolidation_candidates(project_id)?;
        let total_candidates = candidates.len();
        let mut timed_out = false;

        for source in candidates {
            if deadline_elapsed(deadline) {
                timed_out = true;
                break;
            }
            let content_hash = Self::canonical_content_hash(&source.content);
            let existing = semantic_pool
                .iter()
                .find(|s| Self::canonical_content_hash(&s.content) == content_hash);

            if let Some(existing) = existing {
                if !dry_run {
                    let strength = self.source_edge_strength(&source);
                    self.metadata.upsert_edge(
                        &source.id,
                        &existing.id,
                        ConnectionType::Associative,
                        strength,
                    )?;
                }
                report.strengthened += 1;
                report.connections_added += 1;
                continue;
            }

            if dry_run {
                report.promoted += 1;
                report.connections_added += 1;
                continue;
            }

            let promoted_level = promote_level(source.level);
            let mut semantic = Memory::new_episodic(
                source.project_id.clone(),
                promoted_level,
                source.content.clone(),
                source.cognitive_vector.clone(),
                source.dimensions,
            );
            semantic.id = format!("semantic::{}", crate::ids::new_opaque_id());
            semantic.kind = Kind::Semantic;
            semantic.tags = source.tags.clone();
            semantic.payload = source.payload.clone();

            self.metadata.create_memory(&semantic)?;
            self.vectors.ensure_collection(
                &semantic.project_id,
                semantic.level,
                semantic.cognitive_vector.len(),
            )?;
            self.vectors.upsert(
                &semantic.project_id,
                semantic.level,
                &semantic.id,
                &semantic.cognitive_vector,
                crate::storage::VectorPayload {
                    tags: semantic.tags.iter().cloned().collect(),
                },
            )?;

            let strength = self.source_edge_strength(&source);
            self.metadata.upsert_edge(
                &source.id,
                &semantic.id,
                ConnectionType::Associative,
                strength,
            )?;

            report.promoted += 1;
            report.connections_added += 1;
        }

        if !dry_run && !timed_out {
            report.expired = self.expire(project_id)?;
        }

        if timed_out {
            report.causes.push(format!(
                "deadline exceeded after {} of {total_candidates} candidates",
                report.promoted + report.strengthened
            ));
        }
        report.status = if timed_out {
            OperationStatus::Partial
        } else {
            OperationStatus::Ok
        };

        Ok(report)
    }

    fn source_edge_strength(&self, source: &Memory) -> f32 {
        ((source.access_count as f32) / (self.config.consolidation_access_threshold as f32 * 2.0))
            .min(1.0)
            .max(0.1)
    }

    fn select_consolidation_candidates(&self, project_id: &str) -> Result<Vec<Memory>> {
        let episodic = self.metadata.list_by_kind(project_id, Kind::Episodic)?;
        let now = Utc::now();
        Ok(episodic
            .into_iter()
            .filter(|m| m.access_count >= self.config.consolidation_access_threshold)
            .filter(|m| {
                (now - m.created_at).num_days() >= self.config.consolidation_min_age_days
            })
            .filter(|m| {
                self.effective_strength(m) >= self.config.consolidation_strength_threshold
            })
            .collect())
    }

    /// Expiry pass: delete episodic memories below retention strength or
    /// past maximum age (spec §4.7). Deletion cascades per §3.
    pub fn expire(&self, project_id: &str) -> Result<usize> {
        let episodic = self.metadata.list_by_kind(project_id, Kind::Episodic)?;
        let mut expired = 0;
        for memory in episodic {
            if self.should_expire(&memory) {
                self.metadata.delete_memory(&memory.id)?;
                self.vectors
                    .delete(&memory.project_id, memory.level, &[memory.id.clone()])?;
                expired += 1;
            }
        }
        Ok(expired)
    }

    pub fn should_expire(&self, memory: &Memory) -> bool {
        let strength = self.effective_strength(memory);
        let age_days = (Utc::now() - memory.created_at).num_days();
        strength < self.config.min_retention_strength
            || age_days > self.config.max_episodic_age_days
    }
}

fn promote_level(level: Level) -> Level {
    match level {
        Level::Episode => Level::Context,
        Level::Context => Level::Concept,
        Level::Concept => Level::Concept,
    }
}
