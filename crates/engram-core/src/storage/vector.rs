//! VectorStore — namespaced HNSW collections (spec §4.4)
//!
//! Three collections per project (`concepts`/`contexts`/`episodes`), each an
//! independent `usearch` HNSW index keyed by the memory id. Cross-project
//! access is rejected before it ever reaches an index.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::memory::Level;

const HNSW_CONNECTIVITY: usize = 16;
const HNSW_EXPANSION_ADD: usize = 128;
const HNSW_EXPANSION_SEARCH: usize = 64;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("namespace violation: {0}")]
    NamespaceViolation(String),
    #[error("vector backend error: {0}")]
    Backend(String),
}

/// Filterable metadata carried alongside a vector, checked entirely inside
/// the vector store so a search can discard non-matching hits before a
/// round trip to the metadata store.
#[derive(Debug, Clone, Default)]
pub struct VectorPayload {
    pub tags: Vec<String>,
}

/// Constrains a `search` call to hits whose payload carries all listed tags.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub required_tags: Vec<String>,
}

impl VectorFilter {
    fn matches(&self, payload: &VectorPayload) -> bool {
        self.required_tags
            .iter()
            .all(|t| payload.tags.iter().any(|p| p == t))
    }
}

pub trait VectorStore: Send + Sync {
    fn ensure_collection(
        &self,
        project_id: &str,
        level: Level,
        dim: usize,
    ) -> Result<(), VectorStoreError>;

    fn upsert(
        &self,
        project_id: &str,
        level: Level,
        id: &str,
        vector: &[f32],
        payload: VectorPayload,
    ) -> Result<(), VectorStoreError>;

    fn delete(
        &self,
        project_id: &str,
        level: Level,
        ids: &[String],
    ) -> Result<(), VectorStoreError>;

    fn search(
        &self,
        project_id: &str,
        level: Level,
        query_vector: &[f32],
        k: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<(String, f32, VectorPayload)>, VectorStoreError>;

    fn list_collections(&self, project_id: &str) -> Vec<Level>;
}

struct Collection {
    index: Index,
    dim: usize,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    payloads: HashMap<String, VectorPayload>,
    next_id: u64,
}

impl Collection {
    fn new(dim: usize) -> Result<Self, VectorStoreError> {
        let options = IndexOptions {
            dimensions: dim,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: HNSW_CONNECTIVITY,
            expansion_add: HNSW_EXPANSION_ADD,
            expansion_search: HNSW_EXPANSION_SEARCH,
            multi: false,
        };
        let index = Index::new(&options).map_err(|e| VectorStoreError::Backend(e.to_string()))?;
        Ok(Self {
            index,
            dim,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            payloads: HashMap::new(),
            next_id: 0,
        })
    }

    fn reserve_for_one_more(&self) -> Result<(), VectorStoreError> {
        let size = self.index.size();
        let capacity = self.index.capacity();
        if size >= capacity {
            let new_capacity = std::cmp::max(capacity * 2, 16);
            self.index
                .reserve(new_capacity)
                .map_err(|e| VectorStoreError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    fn upsert(
        &mut self,
        id: &str,
        vector: &[f32],
        payload: VectorPayload,
    ) -> Result<(), VectorStoreError> {
        if vector.len() != self.dim {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        if let Some(&existing) = self.key_to_id.get(id) {
            self.index
                .remove(existing)
                .map_err(|e| VectorStoreError::Backend(e.to_string()))?;
            self.reserve_for_one_more()?;
            self.index
                .add(existing, vector)
                .map_err(|e| VectorStoreError::Backend(e.to_string()))?;
        } else {
            self.reserve_for_one_more()?;
            let new_id = self.next_id;
            self.next_id += 1;
            self.index
                .add(new_id, vector)
                .map_err(|e| VectorStoreError::Backend(e.to_string()))?;
            self.key_to_id.insert(id.to_string(), new_id);
            self.id_to_key.insert(new_id, id.to_string());
        }
        self.payloads.insert(id.to_string(), payload);
        Ok(())
    }

    fn delete(&mut self, ids: &[String]) {
        for id in ids {
            if let Some(key) = self.key_to_id.remove(id) {
                self.id_to_key.remove(&key);
                let _ = self.index.remove(key);
            }
            self.payloads.remove(id);
        }
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<(String, f32, VectorPayload)>, VectorStoreError> {
        if query.len() != self.dim {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        if self.index.size() == 0 {
            return Ok(vec![]);
        }
        // Over-fetch to absorb filter rejection, then trim to k.
        let fetch_k = if filter.is_some() {
            (k * 4).max(k + 16).min(self.index.size())
        } else {
            k
        };
        let results = self
            .index
            .search(query, fetch_k)
            .map_err(|e| VectorStoreError::Backend(e.to_string()))?;

        let mut hits: Vec<(String, f32, VectorPayload)> = Vec::new();
        for (key, distance) in results.keys.iter().zip(results.distances.iter()) {
            let Some(id) = self.id_to_key.get(key) else {
                continue;
            };
            let payload = self.payloads.get(id).cloned().unwrap_or_default();
            if let Some(f) = filter {
                if !f.matches(&payload) {
                    continue;
                }
            }
            let score = 1.0 - distance;
            hits.push((id.clone(), score, payload));
        }

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

/// Default `VectorStore`: one in-process `usearch` HNSW index per
/// `(project_id, level)` collection, guarded by a single lock per collection
/// map (writes are infrequent relative to search; see §5).
pub struct UsearchVectorStore {
    collections: RwLock<HashMap<(String, Level), Collection>>,
}

impl UsearchVectorStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn key(project_id: &str, level: Level) -> (String, Level) {
        (project_id.to_string(), level)
    }
}

impl Default for UsearchVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorStore for UsearchVectorStore {
    fn ensure_collection(
        &self,
        project_id: &str,
        level: Level,
        dim: usize,
    ) -> Result<(), VectorStoreError> {
        let key = Self::key(project_id, level);
        {
            let existing = self.collections.read().unwrap();
            if let Some(c) = existing.get(&key) {
                if c.dim != dim {
                    return Err(VectorStoreError::DimensionMismatch {
                        expected: c.dim,
                        got: dim,
                    });
                }
                return Ok(());
            }
        }
        let mut collections = self.collections.write().unwrap();
        if let Some(c) = collections.get(&key) {
            if c.dim != dim {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: c.dim,
                    got: dim,
                });
            }
            return Ok(());
        }
        collections.insert(key, Collection::new(dim)?);
        Ok(())
    }

    fn upsert(
        &self,
        project_id: &str,
        level: Level,
        id: &str,
        vector: &[f32],
        payload: VectorPayload,
    ) -> Result<(), VectorStoreError> {
        let key = Self::key(project_id, level);
        let mut collections = self.collections.write().unwrap();
        let collection = collections.get_mut(&key).ok_or_else(|| {
            VectorStoreError::NamespaceViolation(format!(
                "collection {}_{} does not exist; call ensure_collection first",
                project_id,
                level.collection_name()
            ))
        })?;
        collection.upsert(id, vector, payload)
    }

    fn delete(
        &self,
        project_id: &str,
        level: Level,
        ids: &[String],
    ) -> Result<(), VectorStoreError> {
        let key = Self::key(project_id, level);
        let mut collections = self.collections.write().unwrap();
        if let Some(collection) = collections.get_mut(&key) {
            collection.delete(ids);
        }
        Ok(())
    }

    fn search(
        &self,
        project_id: &str,
        level: Level,
        query_vector: &[f32],
        k: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<(String, f32, VectorPayload)>, VectorStoreError> {
        let key = Self::key(project_id, level);
        let collections = self.collections.read().unwrap();
        match collections.get(&key) {
            Some(collection) => collection.search(query_vector, k, filter),
            None => Ok(vec![]),
        }
    }

    fn list_collections(&self, project_id: &str) -> Vec<Level> {
        let collections = self.collections.read().unwrap();
        let mut levels: Vec<Level> = collections
            .keys()
            .filter(|(p, _)| p == project_id)
            .map(|(_, l)| *l)
            .collect();
        levels.sort();
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(seed: f32, dim: usize) -> Vec<f32> {
        (0..dim).map(|i| ((i as f32 + seed) / dim as f32).sin()).collect()
    }

    #[test]
    fn ensure_collection_is_idempotent() {
        let store = UsearchVectorStore::new();
        store.ensure_collection("proj", Level::Episode, 8).unwrap();
        store.ensure_collection("proj", Level::Episode, 8).unwrap();
    }

    #[test]
    fn ensure_collection_rejects_dimension_change() {
        let store = UsearchVectorStore::new();
        store.ensure_collection("proj", Level::Episode, 8).unwrap();
        let err = store.ensure_collection("proj", Level::Episode, 16).unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn upsert_then_search_finds_self_first() {
        let store = UsearchVectorStore::new();
        store.ensure_collection("proj", Level::Episode, 8).unwrap();
        let v1 = vec_of(1.0, 8);
        let v2 = vec_of(50.0, 8);
        store
            .upsert("proj", Level::Episode, "a", &v1, VectorPayload::default())
            .unwrap();
        store
            .upsert("proj", Level::Episode, "b", &v2, VectorPayload::default())
            .unwrap();

        let hits = store
            .search("proj", Level::Episode, &v1, 2, None)
            .unwrap();
        assert_eq!(hits[0].0, "a");
    }

    #[test]
    fn delete_removes_from_future_searches() {
        let store = UsearchVectorStore::new();
        store.ensure_collection("proj", Level::Episode, 8).unwrap();
        let v1 = vec_of(1.0, 8);
        store
            .upsert("proj", Level::Episode, "a", &v1, VectorPayload::default())
            .unwrap();
        store
            .delete("proj", Level::Episode, &["a".to_string()])
            .unwrap();
        let hits = store
            .search("proj", Level::Episode, &v1, 5, None)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn delete_of_missing_id_is_not_an_error() {
        let store = UsearchVectorStore::new();
        store.ensure_collection("proj", Level::Episode, 8).unwrap();
        store
            .delete("proj", Level::Episode, &["nonexistent".to_string()])
            .unwrap();
    }

    #[test]
    fn search_filter_rejects_non_matching_tags() {
        let store = UsearchVectorStore::new();
        store.ensure_collection("proj", Level::Episode, 8).unwrap();
        let v1 = vec_of(1.0, 8);
        store
            .upsert(
                "proj",
                Level::Episode,
                "a",
                &v1,
                VectorPayload {
                    tags: vec!["bug_fix".to_string()],
                },
            )
            .unwrap();
        let filter = VectorFilter {
            required_tags: vec!["feature".to_string()],
        };
        let hits = store
            .search("proj", Level::Episode, &v1, 5, Some(&filter))
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn collections_are_namespaced_per_project() {
        let store = UsearchVectorStore::new();
        store.ensure_collection("proj-a", Level::Episode, 8).unwrap();
        let hits = store
            .search("proj-b", Level::Episode, &vec_of(1.0, 8), 5, None)
            .unwrap();
        assert!(hits.is_empty());
    }
}
