//! MetadataStore — the single-file ACID record store (spec §4.5)
//!
//! Owns every non-vector invariant: parent/level checks, edge constraints,
//! access bookkeeping, tag and source-path indexes. A writer connection
//! serializes all mutations; a separate reader connection lets queries
//! proceed concurrently (WAL mode), mirroring the teacher's storage layer.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::memory::{Connection as MemConnection, ConnectionType, Kind, Level, Memory, MemoryPayload, RetrievalClass};

use super::migrations;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate id: {0}")]
    DuplicateId(String),
    #[error("invalid parent: {0}")]
    InvalidParent(String),
    #[error("level out of range: {0}")]
    LevelOutOfRange(i32),
    #[error("invalid edge: {0}")]
    InvalidEdge(String),
    #[error("initialization error: {0}")]
    Init(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Aggregate counts for `query_activity_window` (spec §4.13).
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityWindowStats {
    pub commit_count: i64,
    pub access_count: i64,
}

pub trait MetadataStore: Send + Sync {
    fn create_memory(&self, memory: &Memory) -> Result<()>;
    fn delete_memory(&self, id: &str) -> Result<bool>;
    fn get_memory(&self, id: &str) -> Result<Option<Memory>>;
    fn query_by_source_path(&self, path: &str) -> Result<Vec<Memory>>;
    fn delete_by_source_path(&self, path: &str) -> Result<usize>;
    fn query_by_tags(&self, tags: &[String]) -> Result<Vec<Memory>>;
    fn delete_by_tags(&self, tags: &[String]) -> Result<usize>;
    /// All memories of the given kind in `project_id`. Used by consolidation
    /// and expiry passes, which need a full scan rather than an index lookup.
    fn list_by_kind(&self, project_id: &str, kind: Kind) -> Result<Vec<Memory>>;
    fn upsert_edge(
        &self,
        source: &str,
        target: &str,
        connection_type: ConnectionType,
        strength: f32,
    ) -> Result<()>;
    fn get_neighbors(
        &self,
        id: &str,
        min_strength: f32,
    ) -> Result<Vec<(String, ConnectionType, f32)>>;
    fn record_access(&self, id: &str, class: RetrievalClass, at: DateTime<Utc>) -> Result<()>;
    fn query_activity_window(&self, window: Duration) -> Result<ActivityWindowStats>;
    fn most_recent_commit_sha(&self, project_id: &str) -> Result<Option<String>>;
    fn record_commit_ingest_cursor(&self, repo_path: &str, sha: &str) -> Result<()>;
}

/// Default `MetadataStore`, backed by one SQLite file per project.
pub struct SqliteMetadataStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl SqliteMetadataStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = Connection::open(db_path)?;
        configure_connection(&writer)?;
        migrations::apply_migrations(&writer)?;

        let reader = Connection::open(db_path)?;
        configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    /// An in-memory store for tests. Writer and reader share one database
    /// via a uniquely-named shared-cache URI (plain `:memory:` connections
    /// are each their own isolated database).
    pub fn open_in_memory() -> Result<Self> {
        let uri = format!(
            "file:engram-{}?mode=memory&cache=shared",
            crate::ids::new_opaque_id()
        );
        let writer = Connection::open(&uri)?;
        configure_connection(&writer)?;
        migrations::apply_migrations(&writer)?;
        let reader = Connection::open(&uri)?;
        configure_connection(&reader)?;
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn encode_dimensions(d: &[f32; 16]) -> Vec<u8> {
    encode_vector(d)
}

fn decode_dimensions(bytes: &[u8]) -> [f32; 16] {
    let v = decode_vector(bytes);
    let mut out = [0.0f32; 16];
    for (i, x) in v.into_iter().take(16).enumerate() {
        out[i] = x;
    }
    out
}

fn row_to_memory(conn: &Connection, row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    let id: String = row.get("id")?;
    let level_raw: i32 = row.get("level")?;
    let kind_raw: String = row.get("kind")?;
    let payload_raw: String = row.get("payload")?;
    let vector_raw: Vec<u8> = row.get("cognitive_vector")?;
    let dims_raw: Vec<u8> = row.get("dimensions")?;

    let level = Level::from_i32(level_raw).unwrap_or(Level::Episode);
    let kind = if kind_raw == "semantic" {
        Kind::Semantic
    } else {
        Kind::Episodic
    };
    let payload: MemoryPayload =
        serde_json::from_str(&payload_raw).unwrap_or(MemoryPayload::Generic);

    let mut tags_stmt = conn.prepare_cached("SELECT tag FROM memory_tags WHERE memory_id = ?1")?;
    let tags: HashSet<String> = tags_stmt
        .query_map(params![id], |r| r.get::<_, String>(0))?
        .filter_map(|r| r.ok())
        .collect();

    Ok(Memory {
        id,
        level,
        kind,
        content: row.get("content")?,
        cognitive_vector: decode_vector(&vector_raw),
        dimensions: decode_dimensions(&dims_raw),
        created_at: row.get("created_at")?,
        last_accessed_at: row.get("last_accessed_at")?,
        access_count: row.get("access_count")?,
        importance: row.get("importance")?,
        decay_rate: row.get("decay_rate")?,
        parent_id: row.get("parent_id")?,
        tags,
        source_path: row.get("source_path")?,
        project_id: row.get("project_id")?,
        payload,
    })
}

impl SqliteMetadataStore {
    fn fetch_memory(conn: &Connection, id: &str) -> Result<Option<Memory>> {
        let mut stmt = conn.prepare_cached("SELECT * FROM memories WHERE id = ?1")?;
        let memory = stmt
            .query_row(params![id], |row| row_to_memory(conn, row))
            .optional()?;
        Ok(memory)
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn create_memory(&self, memory: &Memory) -> Result<()> {
        let mut conn = self.writer.lock().unwrap();
        let tx = conn.transaction()?;

        let exists: Option<String> = tx
            .query_row(
                "SELECT id FROM memories WHERE id = ?1",
                params![memory.id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::DuplicateId(memory.id.clone()));
        }

        if let Some(parent_id) = &memory.parent_id {
            let parent_level: Option<i32> = tx
                .query_row(
                    "SELECT level FROM memories WHERE id = ?1",
                    params![parent_id],
                    |r| r.get(0),
                )
                .optional()?;
            match parent_level {
                None => {
                    return Err(StoreError::InvalidParent(format!(
                        "parent {parent_id} does not exist"
                    )))
                }
                Some(pl) if pl >= memory.level as i32 => {
                    return Err(StoreError::InvalidParent(format!(
                        "parent {parent_id} is not at a strictly lower level"
                    )))
                }
                Some(_) => {}
            }
        }

        let kind_str = match memory.kind {
            Kind::Episodic => "episodic",
            Kind::Semantic => "semantic",
        };
        let payload_json = serde_json::to_string(&memory.payload)
            .map_err(|e| StoreError::InvalidEdge(e.to_string()))?;

        tx.execute(
            "INSERT INTO memories (
                id, project_id, level, kind, content, cognitive_vector, dimensions,
                created_at, last_accessed_at, access_count, importance, decay_rate,
                parent_id, source_path, payload
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                memory.id,
                memory.project_id,
                memory.level as i32,
                kind_str,
                memory.content,
                encode_vector(&memory.cognitive_vector),
                encode_dimensions(&memory.dimensions),
                memory.created_at,
                memory.last_accessed_at,
                memory.access_count,
                memory.importance,
                memory.decay_rate,
                memory.parent_id,
                memory.source_path,
                payload_json,
            ],
        )?;

        for tag in &memory.tags {
            tx.execute(
                "INSERT OR IGNORE INTO memory_tags (memory_id, tag) VALUES (?1, ?2)",
                params![memory.id, tag],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_memory(&self, id: &str) -> Result<bool> {
        let conn = self.writer.lock().unwrap();
        let affected = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let conn = self.reader.lock().unwrap();
        Self::fetch_memory(&conn, id)
    }

    fn query_by_source_path(&self, path: &str) -> Result<Vec<Memory>> {
        let canonical = crate::ids::canonicalize_path(path);
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM memories WHERE source_path = ?1")?;
        let rows = stmt
            .query_map(params![canonical], |row| row_to_memory(&conn, row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn delete_by_source_path(&self, path: &str) -> Result<usize> {
        let canonical = crate::ids::canonicalize_path(path);
        let conn = self.writer.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM memories WHERE source_path = ?1",
            params![canonical],
        )?;
        Ok(affected)
    }

    fn query_by_tags(&self, tags: &[String]) -> Result<Vec<Memory>> {
        if tags.is_empty() {
            return Ok(vec![]);
        }
        let conn = self.reader.lock().unwrap();
        let placeholders = vec!["?"; tags.len()].join(",");
        let sql = format!(
            "SELECT DISTINCT m.* FROM memories m
             JOIN memory_tags t ON t.memory_id = m.id
             WHERE t.tag IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            tags.iter().map(|t| t as &dyn rusqlite::ToSql).collect();
        let rows = stmt
            .query_map(params.as_slice(), |row| row_to_memory(&conn, row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn delete_by_tags(&self, tags: &[String]) -> Result<usize> {
        if tags.is_empty() {
            return Ok(0);
        }
        let conn = self.writer.lock().unwrap();
        let placeholders = vec!["?"; tags.len()].join(",");
        let sql = format!(
            "DELETE FROM memories WHERE id IN (
                SELECT DISTINCT m.id FROM memories m
                JOIN memory_tags t ON t.memory_id = m.id
                WHERE t.tag IN ({placeholders})
            )"
        );
        let params: Vec<&dyn rusqlite::ToSql> =
            tags.iter().map(|t| t as &dyn rusqlite::ToSql).collect();
        let affected = conn.execute(&sql, params.as_slice())?;
        Ok(affected)
    }

    fn list_by_kind(&self, project_id: &str, kind: Kind) -> Result<Vec<Memory>> {
        let kind_str = match kind {
            Kind::Episodic => "episodic",
            Kind::Semantic => "semantic",
        };
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM memories WHERE project_id = ?1 AND kind = ?2")?;
        let rows = stmt
            .query_map(params![project_id, kind_str], |row| row_to_memory(&conn, row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn upsert_edge(
        &self,
        source: &str,
        target: &str,
        connection_type: ConnectionType,
        strength: f32,
    ) -> Result<()> {
        if source == target {
            return Err(StoreError::InvalidEdge(
                "source and target must differ".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&strength) {
            return Err(StoreError::InvalidEdge(format!(
                "strength {strength} out of [0,1]"
            )));
        }
        let type_str = connection_type_str(connection_type);
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO connections (source_id, target_id, strength, connection_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_id, target_id, connection_type)
             DO UPDATE SET strength = excluded.strength",
            params![source, target, strength, type_str, Utc::now()],
        )?;
        Ok(())
    }

    fn get_neighbors(
        &self,
        id: &str,
        min_strength: f32,
    ) -> Result<Vec<(String, ConnectionType, f32)>> {
        let conn = self.reader.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT target_id, connection_type, strength FROM connections
             WHERE source_id = ?1 AND strength >= ?2",
        )?;
        let rows = stmt
            .query_map(params![id, min_strength], |row| {
                let target: String = row.get(0)?;
                let type_str: String = row.get(1)?;
                let strength: f32 = row.get(2)?;
                Ok((target, connection_type_from_str(&type_str), strength))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn record_access(&self, id: &str, class: RetrievalClass, at: DateTime<Utc>) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        let class_str = match class {
            RetrievalClass::Core => "core",
            RetrievalClass::Peripheral => "peripheral",
            RetrievalClass::Bridge => "bridge",
        };
        conn.execute(
            "INSERT INTO access_events (memory_id, at, retrieval_class) VALUES (?1, ?2, ?3)",
            params![id, at, class_str],
        )?;
        let affected = conn.execute(
            "UPDATE memories SET last_accessed_at = ?1, access_count = access_count + 1 WHERE id = ?2",
            params![at, id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn query_activity_window(&self, window: Duration) -> Result<ActivityWindowStats> {
        let since = Utc::now() - window;
        let conn = self.reader.lock().unwrap();
        let access_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM access_events WHERE at >= ?1",
            params![since],
            |r| r.get(0),
        )?;
        let commit_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memories WHERE source_path IS NULL
                 AND id LIKE 'git::commit::%' AND created_at >= ?1",
                params![since],
                |r| r.get(0),
            )
            .unwrap_or(0);
        Ok(ActivityWindowStats {
            commit_count,
            access_count,
        })
    }

    fn most_recent_commit_sha(&self, project_id: &str) -> Result<Option<String>> {
        let conn = self.reader.lock().unwrap();
        let sha = conn
            .query_row(
                "SELECT id FROM memories
                 WHERE project_id = ?1 AND id LIKE 'git::commit::%'
                 ORDER BY created_at DESC LIMIT 1",
                params![project_id],
                |r| r.get::<_, String>(0),
            )
            .optional()?
            .map(|id| id.trim_start_matches("git::commit::").to_string());
        Ok(sha)
    }

    fn record_commit_ingest_cursor(&self, repo_path: &str, sha: &str) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO git_ingest_state (repo_path, last_commit_sha, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(repo_path) DO UPDATE SET last_commit_sha = excluded.last_commit_sha, updated_at = excluded.updated_at",
            params![repo_path, sha, Utc::now()],
        )?;
        Ok(())
    }
}

fn connection_type_str(t: ConnectionType) -> &'static str {
    match t {
        ConnectionType::Hierarchical => "hierarchical",
        ConnectionType::Sequential => "sequential",
        ConnectionType::Associative => "associative",
    }
}

fn connection_type_from_str(s: &str) -> ConnectionType {
    match s {
        "hierarchical" => ConnectionType::Hierarchical,
        "sequential" => ConnectionType::Sequential,
        _ => ConnectionType::Associative,
    }
}

/// Convert a stored edge row plus endpoints into the shared `Connection` type,
/// used by `ConnectionGraph` adjacency iteration.
pub fn to_connection(
    source_id: String,
    target_id: String,
    connection_type: ConnectionType,
    strength: f32,
    created_at: DateTime<Utc>,
    last_activated_at: Option<DateTime<Utc>>,
    activation_count: i64,
) -> MemConnection {
    MemConnection {
        source_id,
        target_id,
        strength,
        connection_type,
        created_at,
        last_activated_at,
        activation_count,
    }
}
