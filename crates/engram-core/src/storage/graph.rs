//! ConnectionGraph — thin adjacency façade over `MetadataStore` edges
//! (spec §4.6). No owning pointer graph; traversal is by id only, so the
//! same `MetadataStore` handle backs both memory lookups and edge walks.

use std::sync::Arc;

use crate::memory::ConnectionType;
use crate::storage::metadata::{MetadataStore, Result};

/// One step of BFS adjacency: the neighbor id, the edge type, and its
/// strength.
pub type Neighbor = (String, ConnectionType, f32);

pub struct ConnectionGraph {
    store: Arc<dyn MetadataStore>,
}

impl ConnectionGraph {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Neighbors of `id` with edge strength at least `min_strength`,
    /// optionally restricted to a single connection type.
    pub fn neighbors(
        &self,
        id: &str,
        min_strength: f32,
        type_filter: Option<ConnectionType>,
    ) -> Result<Vec<Neighbor>> {
        let all = self.store.get_neighbors(id, min_strength)?;
        Ok(match type_filter {
            Some(t) => all.into_iter().filter(|(_, ct, _)| *ct == t).collect(),
            None => all,
        })
    }

    pub fn upsert_edge(
        &self,
        source: &str,
        target: &str,
        connection_type: ConnectionType,
        strength: f32,
    ) -> Result<()> {
        self.store
            .upsert_edge(source, target, connection_type, strength)
    }
}
