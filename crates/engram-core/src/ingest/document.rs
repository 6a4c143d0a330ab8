//! MarkdownLoader — the reference structured-document loader (spec §4.11)
//!
//! Heading-tree parse → level classification → token-bounded chunking →
//! breadcrumb assembly → encode → upsert, then hierarchical/sequential/
//! associative edge derivation. Idempotent by `source_path`: re-loading the
//! same path replaces its whole memory set.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use std::sync::OnceLock;

use regex::Regex;

use crate::config::{EngineConfig, IngestAtomicity};
use crate::embeddings::cosine_similarity;
use crate::encoder::CognitiveEncoder;
use crate::error::{check_deadline, deadline_elapsed, OperationStatus, Result};
use crate::memory::{ConnectionType, Level, Memory, MemoryPayload};
use crate::storage::{MetadataStore, VectorPayload, VectorStore};

/// Outcome of a single `load` call (spec §4.14 `load_memories`). A reload
/// is a delete-then-recreate of the whole source path (see `load`), so
/// this only ever reports `added`/`failed` — there is no diff against the
/// prior set to report as `updated`.
#[derive(Debug, Clone, Default)]
pub struct DocumentLoadReport {
    pub added: usize,
    pub failed: usize,
    pub connections_added: usize,
    pub status: OperationStatus,
    pub causes: Vec<String>,
}

struct DocumentNode {
    title: String,
    depth: usize,
    body: String,
    children: Vec<DocumentNode>,
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.*)$").unwrap())
}

fn imperative_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^\s*(run|add|remove|fix|update|create|delete|install|configure|set|use|check|ensure|implement|refactor|call|invoke)\b").unwrap()
    })
}

fn code_fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[\s\S]*?```").unwrap())
}

fn inline_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`[^`\n]+`").unwrap())
}

/// Parse a markdown document into a heading tree. The synthetic root node
/// (depth 0) carries any content before the first heading.
fn parse(text: &str) -> DocumentNode {
    struct Raw {
        depth: usize,
        title: String,
        body: String,
    }
    let mut raws: Vec<Raw> = vec![Raw {
        depth: 0,
        title: String::new(),
        body: String::new(),
    }];

    for line in text.lines() {
        if let Some(caps) = heading_regex().captures(line) {
            let depth = caps[1].len();
            let title = caps[2].trim().to_string();
            raws.push(Raw {
                depth,
                title,
                body: String::new(),
            });
        } else {
            let last = raws.last_mut().unwrap();
            last.body.push_str(line);
            last.body.push('\n');
        }
    }

    // Build the tree bottom-up: push each heading, then fold any deeper
    // siblings/children into their parent once a shallower heading arrives.
    let mut stack: Vec<DocumentNode> = vec![DocumentNode {
        title: String::new(),
        depth: 0,
        body: String::new(),
        children: Vec::new(),
    }];

    for raw in raws.into_iter() {
        if raw.depth == 0 {
            stack[0].body = raw.body;
            continue;
        }
        while stack.len() > 1 && stack.last().unwrap().depth >= raw.depth {
            let finished = stack.pop().unwrap();
            stack.last_mut().unwrap().children.push(finished);
        }
        stack.push(DocumentNode {
            title: raw.title,
            depth: raw.depth,
            body: raw.body,
            children: Vec::new(),
        });
    }
    while stack.len() > 1 {
        let finished = stack.pop().unwrap();
        stack.last_mut().unwrap().children.push(finished);
    }
    stack.pop().unwrap()
}

fn code_fraction(text: &str) -> f32 {
    let code_chars: usize = code_fence_regex().find_iter(text).map(|m| m.len()).sum::<usize>()
        + inline_code_regex().find_iter(text).map(|m| m.len()).sum::<usize>();
    (code_chars as f32 / text.len().max(1) as f32).min(1.0)
}

fn imperative_density(text: &str) -> f32 {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return 0.0;
    }
    let hits = lines
        .iter()
        .filter(|l| imperative_regex().is_match(l))
        .count();
    hits as f32 / lines.len() as f32
}

/// Classify a node's intended memory level from linguistic features
/// (spec §4.11 step 2). Noun-ratio estimation is approximated by the
/// inverse of imperative density plus code fraction, since a full POS
/// tagger is out of scope for this crate.
fn classify_level(title: &str, body: &str, depth: usize) -> Level {
    let combined = format!("{title}\n{body}");
    let code = code_fraction(&combined);
    let imperative = imperative_density(&combined);

    if imperative > 0.5 || code > 0.3 {
        return Level::Episode;
    }
    if depth <= 1 && imperative < 0.2 && code < 0.1 {
        return Level::Concept;
    }
    Level::Context
}

/// A document memory candidate before encoding: breadcrumb path, classified
/// level, assembled text, and the indices needed to derive edges afterward.
struct Chunk {
    breadcrumb: String,
    section_path: Vec<usize>,
    level: Level,
    content: String,
    parent_chunk_index: Option<usize>,
}

fn flatten_and_chunk(
    node: &DocumentNode,
    path_titles: &mut Vec<String>,
    section_path: &mut Vec<usize>,
    chunk_token_budget: usize,
    parent_chunk_index: Option<usize>,
    out: &mut Vec<Chunk>,
) {
    if !node.title.is_empty() {
        path_titles.push(node.title.clone());
    }
    let breadcrumb = path_titles.join(" :: ");
    let level = classify_level(&node.title, &node.body, node.depth);

    let own_chunk_index = if !node.body.trim().is_empty() || node.children.is_empty() {
        let paragraphs: Vec<&str> = node.body.split("\n\n").map(|p| p.trim()).filter(|p| !p.is_empty()).collect();
        if paragraphs.is_empty() {
            let content = if breadcrumb.is_empty() {
                node.title.clone()
            } else {
                format!("{breadcrumb} :: {}", node.title)
            };
            out.push(Chunk {
                breadcrumb: breadcrumb.clone(),
                section_path: section_path.clone(),
                level,
                content,
                parent_chunk_index,
            });
            Some(out.len() - 1)
        } else {
            let section_start = out.len();
            let mut group = String::new();
            for paragraph in paragraphs {
                let candidate_len = group.split_whitespace().count() + paragraph.split_whitespace().count();
                if !group.is_empty() && candidate_len > chunk_token_budget {
                    out.push(Chunk {
                        breadcrumb: breadcrumb.clone(),
                        section_path: section_path.clone(),
                        level,
                        content: format!("{breadcrumb} :: {}", group.trim()),
                        parent_chunk_index,
                    });
                    group.clear();
                }
                if !group.is_empty() {
                    group.push_str("\n\n");
                }
                group.push_str(paragraph);
            }
            if !group.trim().is_empty() {
                out.push(Chunk {
                    breadcrumb: breadcrumb.clone(),
                    section_path: section_path.clone(),
                    level,
                    content: format!("{breadcrumb} :: {}", group.trim()),
                    parent_chunk_index,
                });
            }
            if out.len() > section_start {
                Some(section_start)
            } else {
                None
            }
        }
    } else {
        None
    };

    let this_level_parent = own_chunk_index.or(parent_chunk_index);
    for (i, child) in node.children.iter().enumerate() {
        section_path.push(i);
        flatten_and_chunk(
            child,
            path_titles,
            section_path,
            chunk_token_budget,
            this_level_parent,
            out,
        );
        section_path.pop();
    }

    if !node.title.is_empty() {
        path_titles.pop();
    }
}

fn lexical_tokens(text: &str) -> HashSet<String> {
    const STOPWORDS: &[&str] = &[
        "the", "a", "an", "of", "to", "and", "or", "in", "on", "for", "is", "are", "this", "that",
        "with", "as", "by", "it", "be", "at",
    ];
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn structural_proximity(a: &[usize], b: &[usize]) -> f32 {
    let common = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
    let distance = (a.len() - common) + (b.len() - common);
    1.0 / (1.0 + distance as f32)
}

pub struct MarkdownLoader {
    config: EngineConfig,
    encoder: Arc<CognitiveEncoder>,
    metadata: Arc<dyn MetadataStore>,
    vectors: Arc<dyn VectorStore>,
}

impl MarkdownLoader {
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

    /// Does this loader claim the given path's extension?
    pub fn claims(path: &str) -> bool {
        path.ends_with(".md") || path.ends_with(".markdown")
    }

    pub fn load(
        &self,
        project_id: &str,
        source_path: &str,
        text: &str,
        deadline: Option<Instant>,
    ) -> Result<DocumentLoadReport> {
        check_deadline(deadline)?;

        let canonical_path = crate::ids::canonicalize_path(source_path);
        let tree = parse(text);

        let mut chunks = Vec::new();
        let mut titles = Vec::new();
        let mut section_path = Vec::new();
        flatten_and_chunk(
            &tree,
            &mut titles,
            &mut section_path,
            self.config.ingest_chunk_token_budget,
            None,
            &mut chunks,
        );

        let mut report = DocumentLoadReport::default();
        if chunks.is_empty() {
            return Ok(report);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let encoded = match self.encoder.encode_batch(&texts) {
            Ok(e) => e,
            Err(_) => {
                report.failed = chunks.len();
                report.status = OperationStatus::Error;
                report
                    .causes
                    .push(format!("encoding failed for all {} chunks", chunks.len()));
                return Ok(report);
            }
        };

        self.metadata.delete_by_source_path(&canonical_path)?;

        let mut ids: Vec<String> = Vec::with_capacity(chunks.len());
        let mut created_ids: Vec<(Level, String)> = Vec::new();
        let mut timed_out = false;

        for (chunk, enc) in chunks.iter().zip(encoded.iter()) {
            if deadline_elapsed(deadline) {
                timed_out = true;
                break;
            }
            let id = crate::ids::new_opaque_id();
            ids.push(id.clone());

            let mut memory = Memory::new_episodic(
                project_id,
                chunk.level,
                chunk.content.clone(),
                enc.vector.clone(),
                enc.dimensions,
            );
            memory.id = id.clone();
            memory.source_path = Some(canonical_path.clone());
            memory.payload = MemoryPayload::DocumentChunk {
                breadcrumb: chunk.breadcrumb.clone(),
                section_path: chunk.section_path.clone(),
            };

            let write: Result<()> = (|| {
                self.metadata.create_memory(&memory)?;
                self.vectors
                    .ensure_collection(project_id, chunk.level, enc.vector.len())?;
                self.vectors
                    .upsert(project_id, chunk.level, &id, &enc.vector, VectorPayload::default())?;
                Ok(())
            })();

            match write {
                Ok(()) => {
                    created_ids.push((chunk.level, id));
                    report.added += 1;
                }
                Err(_) if self.config.ingest_atomicity == IngestAtomicity::PerChunk => {
                    report.failed += 1;
                }
                Err(e) => {
                    for (level, created) in &created_ids {
                        let _ = self.metadata.delete_memory(created);
                        let _ = self.vectors.delete(project_id, *level, &[created.clone()]);
                    }
                    return Err(e);
                }
            }
        }

        if !timed_out {
            report.connections_added += self.derive_hierarchical_edges(&chunks, &ids)?;
            report.connections_added += self.derive_sequential_edges(&ids)?;
            report.connections_added += self.derive_associative_edges(&chunks, &ids, &encoded)?;
        }

        if timed_out {
            report.causes.push(format!(
                "deadline exceeded after {} of {} chunks",
                report.added + report.failed,
                chunks.len()
            ));
        }
        if report.failed > 0 {
            report
                .causes
                .push(format!("{} chunk(s) failed to write", report.failed));
        }
        report.status = if timed_out || report.failed > 0 {
            OperationStatus::Partial
        } else {
            OperationStatus::Ok
        };

        Ok(report)
    }

    fn derive_hierarchical_edges(&self, chunks: &[Chunk], ids: &[String]) -> Result<usize> {
        let mut count = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            if let Some(parent_index) = chunk.parent_chunk_index {
                if parent_index != i {
                    self.metadata.upsert_edge(
                        &ids[i],
                        &ids[parent_index],
                        ConnectionType::Hierarchical,
                        1.0,
                    )?;
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    fn derive_sequential_edges(&self, ids: &[String]) -> Result<usize> {
        let mut count = 0;
        for window in ids.windows(2) {
            self.metadata.upsert_edge(
                &window[0],
                &window[1],
                ConnectionType::Sequential,
                self.config.ingest_sequential_edge_strength,
            )?;
            count += 1;
        }
        Ok(count)
    }

    fn derive_associative_edges(
        &self,
        chunks: &[Chunk],
        ids: &[String],
        encoded: &[crate::encoder::Encoded],
    ) -> Result<usize> {
        let mut count = 0;
        let tokens: Vec<HashSet<String>> = chunks.iter().map(|c| lexical_tokens(&c.content)).collect();

        for i in 0..chunks.len() {
            for j in (i + 1)..chunks.len() {
                let cosine = cosine_similarity(&encoded[i].vector, &encoded[j].vector);
                let lexical = jaccard(&tokens[i], &tokens[j]);
                let structural = structural_proximity(&chunks[i].section_path, &chunks[j].section_path);
                let score = self.config.ingest_alpha_cosine * cosine
                    + self.config.ingest_beta_lexical * lexical
                    + self.config.ingest_gamma_structural * structural;
                if score >= self.config.ingest_associative_threshold {
                    self.metadata
                        .upsert_edge(&ids[i], &ids[j], ConnectionType::Associative, score.min(1.0))?;
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::RuleBasedDimensionExtractor;
    use crate::embeddings::DeterministicEmbeddingProvider;
    use crate::storage::{SqliteMetadataStore, UsearchVectorStore};

    fn loader() -> MarkdownLoader {
        let config = EngineConfig::default();
        let encoder = Arc::new(CognitiveEncoder::new(
            Box::new(DeterministicEmbeddingProvider::new(8)),
            Box::new(RuleBasedDimensionExtractor::new()),
        ));
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteMetadataStore::open_in_memory().unwrap());
        let vectors: Arc<dyn VectorStore> = Arc::new(UsearchVectorStore::new());
        MarkdownLoader::new(config, encoder, metadata, vectors)
    }

    const DOC: &str = "# Authentication\n\nOverview of authentication.\n\n## JWT\n\nJWT tokens expire after a fixed duration.\n\n## Session\n\nSession cookies persist server-side.\n\n# Performance\n\n## Caching\n\nCache entries have a TTL too.\n";

    #[test]
    fn claims_markdown_extensions() {
        assert!(MarkdownLoader::claims("docs/guide.md"));
        assert!(!MarkdownLoader::claims("docs/guide.rs"));
    }

    #[test]
    fn load_produces_memories_and_edges() {
        let loader = loader();
        let report = loader.load("proj", "/docs/guide.md", DOC, None).unwrap();
        assert!(report.added > 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.status, OperationStatus::Ok);
    }

    #[test]
    fn reload_with_identical_content_is_idempotent_in_count() {
        let loader = loader();
        let first = loader.load("proj", "/docs/guide.md", DOC, None).unwrap();
        let second = loader.load("proj", "/docs/guide.md", DOC, None).unwrap();
        assert_eq!(first.added, second.added);
    }

    #[test]
    fn a_deadline_already_past_is_rejected_before_any_work() {
        let loader = loader();
        let past = Instant::now() - std::time::Duration::from_secs(1);
        let err = loader
            .load("proj", "/docs/guide.md", DOC, Some(past))
            .unwrap_err();
        assert!(matches!(err, crate::error::EngineError::Timeout));
    }

    #[test]
    fn heading_tree_parses_nested_sections() {
        let tree = parse(DOC);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].title, "Authentication");
        assert_eq!(tree.children[0].children.len(), 2);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let a: HashSet<String> = ["a".to_string()].into_iter().collect();
        let b: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(jaccard(&a, &b), 0.0);
    }
}
