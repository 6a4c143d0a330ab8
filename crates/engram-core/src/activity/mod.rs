//! ActivityTracker — project activity score and decay multiplier (spec §4.13)

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;

use crate::config::EngineConfig;
use crate::storage::MetadataStore;

struct Cached {
    multiplier: f64,
    computed_at: Instant,
}

/// Computes and caches a project's recent-activity multiplier, used by
/// [`crate::lifecycle::DualMemoryStore`] to scale decay rates.
pub struct ActivityTracker {
    config: EngineConfig,
    metadata: Arc<dyn MetadataStore>,
    cache: Mutex<Option<Cached>>,
}

impl ActivityTracker {
    pub fn new(config: EngineConfig, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            config,
            metadata,
            cache: Mutex::new(None),
        }
    }

    /// `activity = w_c · commit_score + w_a · access_score` (spec §4.13).
    fn compute_activity(&self) -> f64 {
        let window = ChronoDuration::days(self.config.activity_window_days);
        let stats = match self.metadata.query_activity_window(window) {
            Ok(s) => s,
            Err(_) => return 0.0,
        };
        let window_days = self.config.activity_window_days.max(1) as f64;
        let commit_score = (stats.commit_count as f64 / (self.config.max_commits_per_day * window_days)).min(1.0);
        let access_score = (stats.access_count as f64 / (self.config.max_accesses_per_day * window_days)).min(1.0);
        self.config.activity_commit_weight * commit_score + self.config.activity_access_weight * access_score
    }

    /// `activity ≥ 0.7 → 2.0`, `[0.2, 0.7) → 1.0`, `< 0.2 → 0.1` (spec §4.13).
    fn multiplier_for(activity: f64) -> f64 {
        if activity >= 0.7 {
            2.0
        } else if activity >= 0.2 {
            1.0
        } else {
            0.1
        }
    }

    /// Current decay multiplier, recomputed at most once per
    /// `activity_cache_ttl_secs`.
    pub fn current_multiplier(&self) -> f64 {
        let mut cache = self.cache.lock().unwrap();
        if let Some(cached) = cache.as_ref() {
            if cached.computed_at.elapsed() < Duration::from_secs(self.config.activity_cache_ttl_secs) {
                return cached.multiplier;
            }
        }
        let multiplier = Self::multiplier_for(self.compute_activity());
        *cache = Some(Cached {
            multiplier,
            computed_at: Instant::now(),
        });
        multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RetrievalClass;
    use crate::storage::SqliteMetadataStore;
    use chrono::Utc;

    #[test]
    fn multiplier_thresholds_match_spec() {
        assert_eq!(ActivityTracker::multiplier_for(0.9), 2.0);
        assert_eq!(ActivityTracker::multiplier_for(0.7), 2.0);
        assert_eq!(ActivityTracker::multiplier_for(0.5), 1.0);
        assert_eq!(ActivityTracker::multiplier_for(0.2), 1.0);
        assert_eq!(ActivityTracker::multiplier_for(0.1), 0.1);
    }

    #[test]
    fn idle_project_yields_low_multiplier() {
        let config = EngineConfig::default();
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteMetadataStore::open_in_memory().unwrap());
        let tracker = ActivityTracker::new(config, metadata);
        assert_eq!(tracker.current_multiplier(), 0.1);
    }

    #[test]
    fn busy_project_yields_high_multiplier() {
        let mut config = EngineConfig::default();
        config.max_accesses_per_day = 1.0;
        config.activity_window_days = 1;
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteMetadataStore::open_in_memory().unwrap());
        let m = crate::memory::Memory::new_episodic(
            "proj",
            crate::memory::Level::Episode,
            "hi",
            vec![0.0; 4],
            [0.0; 16],
        );
        metadata.create_memory(&m).unwrap();
        metadata
            .record_access(&m.id, RetrievalClass::Core, Utc::now())
            .unwrap();

        let tracker = ActivityTracker::new(config, metadata);
        assert_eq!(tracker.current_multiplier(), 2.0);
    }
}
