//! GitPatternLoader — incremental commit ingestion (spec §4.12)
//!
//! Never shells out; walks history through `git2`. Commit ids are
//! deterministic (`git::commit::<sha>`), so re-ingesting an already-seen
//! range is a no-op at the data level.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{TimeZone, Utc};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::encoder::CognitiveEncoder;
use crate::error::{deadline_elapsed, OperationStatus};
use crate::memory::{CommitType, FileChange, FileChangeKind, Level, Memory, MemoryPayload};
use crate::storage::{MetadataStore, VectorPayload, VectorStore};

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GitIngestError {
    #[error("not a git repository: {0}")]
    NotARepository(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("metadata store error: {0}")]
    Metadata(#[from] crate::storage::metadata::StoreError),
    #[error("vector store error: {0}")]
    Vector(#[from] crate::storage::vector::VectorStoreError),
    #[error("encoding error: {0}")]
    Encoding(#[from] crate::embeddings::EmbeddingError),
    #[error("operation timed out")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, GitIngestError>;

/// Outcome of a single `load_git_patterns` call (spec §4.14).
#[derive(Debug, Clone, Default)]
pub struct GitIngestReport {
    pub commits_loaded: usize,
    pub commits_skipped: usize,
    pub commits_failed: usize,
    pub status: OperationStatus,
    pub causes: Vec<String>,
}

pub struct GitPatternLoader {
    config: EngineConfig,
    encoder: Arc<CognitiveEncoder>,
    metadata: Arc<dyn MetadataStore>,
    vectors: Arc<dyn VectorStore>,
}

impl GitPatternLoader {
    pub fn new(
        config: EngineConfig,
        encoder: Arc<CognitiveEncoder>,
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            config,
            encoder,
            metadata,
            vectors,
        }
    }

    pub fn load(
        &self,
        project_id: &str,
        repo_path: &Path,
        deadline: Option<Instant>,
    ) -> Result<GitIngestReport> {
        if deadline_elapsed(deadline) {
            return Err(GitIngestError::Timeout);
        }

        let repo = git2::Repository::open(repo_path)
            .map_err(|e| GitIngestError::NotARepository(e.to_string()))?;

        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)?;

        let cursor = self
            .metadata
            .most_recent_commit_sha(project_id)
            .ok()
            .flatten();

        let mut report = GitIngestReport::default();
        let mut commit_shas: Vec<git2::Oid> = Vec::new();
        let mut seen_cursor = cursor.is_none();

        for oid in revwalk {
            let oid = match oid {
                Ok(oid) => oid,
                Err(_) => {
                    report.commits_failed += 1;
                    continue;
                }
            };
            if let Some(cursor_sha) = &cursor {
                if oid.to_string() == *cursor_sha {
                    seen_cursor = true;
                    continue;
                }
                if !seen_cursor {
                    continue;
                }
            }
            commit_shas.push(oid);
            if commit_shas.len() >= self.config.max_commits_per_load {
                break;
            }
        }

        let mut latest_sha: Option<String> = None;
        let mut co_change_support: HashMap<(String, String), u32> = HashMap::new();
        let mut hotspot_counts: HashMap<String, u32> = HashMap::new();

        let mut timed_out = false;
        let mut commits_seen = 0usize;
        for oid in &commit_shas {
            if deadline_elapsed(deadline) {
                timed_out = true;
                break;
            }
            commits_seen += 1;
            match self.ingest_one_commit(project_id, &repo, *oid) {
                Ok(Some(changed_paths)) => {
                    report.commits_loaded += 1;
                    latest_sha = Some(oid.to_string());
                    self.update_pattern_accumulators(
                        &changed_paths,
                        &mut co_change_support,
                        &mut hotspot_counts,
                    );
                }
                Ok(None) => {
                    report.commits_skipped += 1;
                    latest_sha = Some(oid.to_string());
                }
                Err(_) => {
                    report.commits_failed += 1;
                }
            }
        }

        if let Some(sha) = latest_sha {
            let repo_path_str = repo_path.to_string_lossy().to_string();
            let _ = self.metadata.record_commit_ingest_cursor(&repo_path_str, &sha);
        }

        self.derive_patterns(project_id, &co_change_support, &hotspot_counts, commits_seen);

        if timed_out {
            report.causes.push(format!(
                "deadline exceeded after {commits_seen} of {} commits",
                commit_shas.len()
            ));
        }
        if report.commits_failed > 0 {
            report
                .causes
                .push(format!("{} commit(s) failed to ingest", report.commits_failed));
        }
        report.status = if timed_out || report.commits_failed > 0 {
            OperationStatus::Partial
        } else {
            OperationStatus::Ok
        };

        Ok(report)
    }

    /// Ingest a single commit. Returns `Ok(Some(changed_paths))` if newly
    /// created, `Ok(None)` if it already existed (no-op), `Err` on failure.
    fn ingest_one_commit(
        &self,
        project_id: &str,
        repo: &git2::Repository,
        oid: git2::Oid,
    ) -> Result<Option<Vec<String>>> {
        let commit = repo.find_commit(oid)?;
        let sha = oid.to_string();
        let id = crate::ids::git_commit_id(&sha);

        if self
            .metadata
            .get_memory(&id)
            .ok()
            .flatten()
            .is_some()
        {
            return Ok(None);
        }

        let author = commit.author();
        let committer = commit.committer();
        let authored_at = Utc
            .timestamp_opt(author.when().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        let message = commit.message().unwrap_or("").to_string();
        let message = sanitize_message(&message);
        let (subject, body) = split_message(&message);

        let parents: Vec<String> = commit.parents().map(|p| p.id().to_string()).collect();

        let file_changes = self.diff_file_changes(repo, &commit)?;
        let commit_type = classify_commit_type(&subject, &body);

        let files_summary: String = file_changes
            .iter()
            .map(|f| format!("{}(+{},-{})", f.path, f.lines_added, f.lines_removed))
            .collect::<Vec<_>>()
            .join(", ");
        let content = format!(
            "[{}] {}\n\n{}\n\nfiles: {}",
            commit_type_label(commit_type),
            subject,
            body,
            files_summary
        );

        let encoded = self.encoder.encode(&content)?;

        let changed_paths: Vec<String> = file_changes.iter().map(|f| f.path.clone()).collect();

        let mut memory = Memory::new_episodic(
            project_id,
            Level::Episode,
            content,
            encoded.vector.clone(),
            encoded.dimensions,
        );
        memory.id = id.clone();
        memory.tags.insert(commit_type.as_tag().to_string());
        memory.payload = MemoryPayload::Commit {
            sha: sha.clone(),
            parents,
            author: format!("{} <{}>", author.name().unwrap_or(""), author.email().unwrap_or("")),
            committer: format!("{} <{}>", committer.name().unwrap_or(""), committer.email().unwrap_or("")),
            authored_at,
            files_changed: file_changes,
            commit_type,
        };

        self.metadata.create_memory(&memory)?;
        self.vectors
            .ensure_collection(project_id, Level::Episode, encoded.vector.len())?;
        self.vectors.upsert(
            project_id,
            Level::Episode,
            &id,
            &encoded.vector,
            VectorPayload {
                tags: memory.tags.iter().cloned().collect(),
            },
        )?;

        Ok(Some(changed_paths))
    }

    fn diff_file_changes(
        &self,
        repo: &git2::Repository,
        commit: &git2::Commit,
    ) -> Result<Vec<FileChange>> {
        let tree = commit.tree()?;
        let parent_tree = commit.parent(0).ok().and_then(|p| p.tree().ok());
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        let mut changes: Vec<FileChange> = Vec::new();
        let mut line_counts: HashMap<String, (u32, u32)> = HashMap::new();

        diff.foreach(
            &mut |delta, _| {
                let path = delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default();
                if path.contains("..") {
                    return true;
                }
                let kind = match delta.status() {
                    git2::Delta::Added => FileChangeKind::Add,
                    git2::Delta::Deleted => FileChangeKind::Delete,
                    git2::Delta::Renamed => FileChangeKind::Rename,
                    _ => FileChangeKind::Modify,
                };
                changes.push(FileChange {
                    path,
                    change_kind: kind,
                    lines_added: 0,
                    lines_removed: 0,
                });
                true
            },
            None,
            None,
            Some(&mut |delta, _hunk, line| {
                let path = delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default();
                let entry = line_counts.entry(path).or_insert((0, 0));
                match line.origin() {
                    '+' => entry.0 += 1,
                    '-' => entry.1 += 1,
                    _ => {}
                }
                true
            }),
        )?;

        for change in &mut changes {
            if let Some((added, removed)) = line_counts.get(&change.path) {
                change.lines_added = *added;
                change.lines_removed = *removed;
            }
        }

        Ok(changes)
    }

    fn update_pattern_accumulators(
        &self,
        changed_paths: &[String],
        co_change_support: &mut HashMap<(String, String), u32>,
        hotspot_counts: &mut HashMap<String, u32>,
    ) {
        for path in changed_paths {
            *hotspot_counts.entry(crate::ids::canonicalize_path(path)).or_insert(0) += 1;
        }
        for i in 0..changed_paths.len() {
            for j in (i + 1)..changed_paths.len() {
                let a = crate::ids::canonicalize_path(&changed_paths[i]);
                let b = crate::ids::canonicalize_path(&changed_paths[j]);
                let key = if a <= b { (a, b) } else { (b, a) };
                *co_change_support.entry(key).or_insert(0) += 1;
            }
        }
    }

    fn derive_patterns(
        &self,
        project_id: &str,
        co_change_support: &HashMap<(String, String), u32>,
        hotspot_counts: &HashMap<String, u32>,
        total_commits: usize,
    ) {
        if total_commits == 0 {
            return;
        }
        for ((path_a, path_b), support) in co_change_support {
            let confidence = *support as f64 / (*support as f64 + 2.0);
            let id = crate::ids::git_cochange_id(path_a, path_b);
            let content = format!(
                "Co-change pattern: {path_a} and {path_b} changed together in {support} commits (confidence {confidence:.2})"
            );
            self.upsert_pattern_memory(
                project_id,
                &id,
                &content,
                MemoryPayload::CoChangePattern {
                    path_a: path_a.clone(),
                    path_b: path_b.clone(),
                    support: *support,
                    confidence,
                },
            );
        }

        for (path, problem_count) in hotspot_counts {
            let score = *problem_count as f64 / total_commits as f64;
            let id = crate::ids::git_hotspot_id(path);
            let content = format!(
                "Hotspot: {path} touched by {problem_count} of {total_commits} recent commits (score {score:.2})"
            );
            self.upsert_pattern_memory(
                project_id,
                &id,
                &content,
                MemoryPayload::Hotspot {
                    path: path.clone(),
                    problem_count: *problem_count,
                    score,
                },
            );
        }
    }

    fn upsert_pattern_memory(&self, project_id: &str, id: &str, content: &str, payload: MemoryPayload) {
        let Ok(encoded) = self.encoder.encode(content) else {
            return;
        };
        if let Ok(Some(mut existing)) = self.metadata.get_memory(id) {
            existing.content = content.to_string();
            existing.payload = payload;
            let _ = self.metadata.delete_memory(id);
            existing.cognitive_vector = encoded.vector.clone();
            existing.dimensions = encoded.dimensions;
            let _ = self.metadata.create_memory(&existing);
            let _ = self.vectors.upsert(
                project_id,
                existing.level,
                id,
                &encoded.vector,
                VectorPayload::default(),
            );
            return;
        }

        let mut memory = Memory::new_episodic(
            project_id,
            Level::Context,
            content,
            encoded.vector.clone(),
            encoded.dimensions,
        );
        memory.id = id.to_string();
        memory.payload = payload;
        if self.metadata.create_memory(&memory).is_ok() {
            let _ = self
                .vectors
                .ensure_collection(project_id, Level::Context, encoded.vector.len());
            let _ = self.vectors.upsert(
                project_id,
                Level::Context,
                id,
                &encoded.vector,
                VectorPayload::default(),
            );
        }
    }
}

fn sanitize_message(message: &str) -> String {
    const MAX_LEN: usize = 4000;
    let clean: String = message.chars().filter(|c| !c.is_control() || *c == '\n').collect();
    if clean.len() > MAX_LEN {
        clean.chars().take(MAX_LEN).collect()
    } else {
        clean
    }
}

fn split_message(message: &str) -> (String, String) {
    let mut parts = message.splitn(2, "\n\n");
    let subject = parts.next().unwrap_or("").trim().to_string();
    let body = parts.next().unwrap_or("").trim().to_string();
    (subject, body)
}

fn classify_commit_type(subject: &str, body: &str) -> CommitType {
    let text = format!("{subject} {body}").to_lowercase();
    if text.starts_with("fix") || text.contains("bug") || text.contains("bugfix") {
        CommitType::BugFix
    } else if text.starts_with("feat") || text.contains("feature") {
        CommitType::Feature
    } else if text.starts_with("refactor") {
        CommitType::Refactor
    } else if text.starts_with("docs") || text.contains("documentation") {
        CommitType::Docs
    } else if text.starts_with("test") {
        CommitType::Test
    } else {
        CommitType::Chore
    }
}

fn commit_type_label(t: CommitType) -> &'static str {
    match t {
        CommitType::BugFix => "bug_fix",
        CommitType::Feature => "feature",
        CommitType::Refactor => "refactor",
        CommitType::Docs => "docs",
        CommitType::Test => "test",
        CommitType::Chore => "chore",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_message_truncates_long_input() {
        let long = "a".repeat(5000);
        assert_eq!(sanitize_message(&long).len(), 4000);
    }

    #[test]
    fn split_message_separates_subject_and_body() {
        let (subject, body) = split_message("fix: resolve panic\n\nBecause of an unwrap on None.");
        assert_eq!(subject, "fix: resolve panic");
        assert_eq!(body, "Because of an unwrap on None.");
    }

    #[test]
    fn classify_commit_type_from_conventional_prefix() {
        assert_eq!(classify_commit_type("fix: null check", ""), CommitType::BugFix);
        assert_eq!(classify_commit_type("feat: add retries", ""), CommitType::Feature);
        assert_eq!(classify_commit_type("docs: update readme", ""), CommitType::Docs);
        assert_eq!(classify_commit_type("chore: bump deps", ""), CommitType::Chore);
    }
}
