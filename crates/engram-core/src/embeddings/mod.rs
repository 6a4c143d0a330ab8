//! EmbeddingProvider — semantic text → vector (spec §4.1)
//!
//! A capability trait (Design Notes §9) so the default fastembed-backed
//! implementation and a deterministic, model-free test double both satisfy
//! the same contract: `encode`/`encode_batch`, finite output, deterministic
//! per `(model, text)`, `EncodingError` on empty input or model failure.

#[cfg(feature = "embeddings")]
mod local;

#[cfg(feature = "embeddings")]
pub use local::{LocalEmbeddingProvider, DEFAULT_MODEL_NAME};

use thiserror::Error;

/// Failure modes for embedding generation (spec §7's `EncodingError`).
#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("embedding model initialization failed: {0}")]
    ModelInit(String),
    #[error("embedding generation failed: {0}")]
    EmbeddingFailed(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Maps text to a fixed-dimension, finite-valued vector. Implementations
/// must be deterministic for a given `(model, text)` pair and must reject
/// empty input with [`EmbeddingError::InvalidInput`] rather than returning
/// a degenerate vector — unlike `DimensionExtractor`, which zero-fills on
/// empty input (spec §4.2 vs §4.1).
pub trait EmbeddingProvider: Send + Sync {
    /// Width of vectors this provider returns.
    fn dimensions(&self) -> usize;

    /// Encode a single text.
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Encode a batch of texts. The default implementation calls `encode`
    /// per item; a real provider overrides this to batch model inference
    /// and internally splits batches larger than its configured maximum.
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.encode(t)).collect()
    }
}

/// A deterministic, dependency-free embedding provider for tests and for
/// environments without model weights available. Hashes token n-grams into
/// buckets and L2-normalizes — not semantically meaningful, but satisfies
/// the determinism and finiteness invariants that the property tests in
/// spec §8 require, and lets the rest of the engine be exercised without
/// downloading a model.
pub struct DeterministicEmbeddingProvider {
    dims: usize,
}

impl DeterministicEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl EmbeddingProvider for DeterministicEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dims
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "text cannot be empty".to_string(),
            ));
        }
        let mut vector = vec![0.0f32; self.dims];
        for token in text.split_whitespace() {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash as usize) % self.dims;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        Ok(vector)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two equal-length vectors. Returns 0.0 on
/// length mismatch or zero-norm input rather than panicking.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_provider_is_deterministic() {
        let p = DeterministicEmbeddingProvider::new(32);
        let a = p.encode("hello world").unwrap();
        let b = p.encode("hello world").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn deterministic_provider_rejects_empty_input() {
        let p = DeterministicEmbeddingProvider::new(32);
        assert!(p.encode("").is_err());
    }

    #[test]
    fn deterministic_provider_output_is_finite() {
        let p = DeterministicEmbeddingProvider::new(16);
        let v = p.encode("some arbitrary text with several tokens").unwrap();
        assert!(v.iter().all(|x| x.is_finite()));
        assert_eq!(v.len(), 16);
    }

    #[test]
    fn cosine_similarity_identical_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
