//! Local semantic embeddings backed by `fastembed`.
//!
//! ## Model
//!
//! Default: `AllMiniLML6V2` (ONNX, 384d native output, 256 token context).
//! Unlike the Matryoshka-truncated models in this family's larger siblings,
//! the native width already matches the engine's `D_sem`, so no truncation
//! step runs here — only L2 normalization.

use super::{EmbeddingError, EmbeddingProvider};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Mutex, OnceLock};

/// Model name reported by [`LocalEmbeddingProvider::model_name`].
pub const DEFAULT_MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Native output width of the default model.
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Fastembed truncates/pads internally past this; kept as a guard against
/// pathologically long documents being handed in whole.
pub const MAX_TEXT_LENGTH: usize = 8192;

pub const BATCH_SIZE: usize = 32;

static EMBEDDING_MODEL_RESULT: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

fn get_cache_dir(models_dir: Option<&std::path::Path>) -> std::path::PathBuf {
    if let Some(dir) = models_dir {
        return dir.to_path_buf();
    }
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "engram", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/engram/fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model(
    models_dir: Option<&std::path::Path>,
) -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL_RESULT.get_or_init(|| {
        let cache_dir = get_cache_dir(models_dir);
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("failed to create model cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(true)
            .with_cache_dir(cache_dir);

        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| {
                format!(
                    "failed to initialize {DEFAULT_MODEL_NAME}: {e}. \
                     ensure ONNX runtime is available and model files can be downloaded"
                )
            })
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("lock poisoned: {e}"))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

fn clamp_len(text: &str) -> &str {
    if text.len() > MAX_TEXT_LENGTH {
        &text[..MAX_TEXT_LENGTH]
    } else {
        text
    }
}

/// `EmbeddingProvider` backed by a process-global, lazily-initialized
/// fastembed model. Cheap to construct; the model itself loads once.
pub struct LocalEmbeddingProvider {
    models_dir: Option<std::path::PathBuf>,
}

impl LocalEmbeddingProvider {
    pub fn new() -> Self {
        Self { models_dir: None }
    }

    /// Use a specific directory for model weight storage instead of the
    /// platform cache dir (set from `EngineConfig::models_dir`).
    pub fn with_models_dir(models_dir: std::path::PathBuf) -> Self {
        Self {
            models_dir: Some(models_dir),
        }
    }

    /// Force model initialization (otherwise deferred to first `encode`).
    pub fn init(&self) -> Result<(), EmbeddingError> {
        get_model(self.models_dir.as_deref()).map(|_| ())
    }

    pub fn model_name(&self) -> &'static str {
        DEFAULT_MODEL_NAME
    }
}

impl Default for LocalEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "text cannot be empty".to_string(),
            ));
        }
        let mut model = get_model(self.models_dir.as_deref())?;
        let text = clamp_len(text);
        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
        let vector = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("no embedding generated".to_string()))?;
        Ok(normalize(vector))
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let mut model = get_model(self.models_dir.as_deref())?;
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let clamped: Vec<&str> = chunk.iter().map(|t| clamp_len(t)).collect();
            let embeddings = model
                .embed(clamped, None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
            out.extend(embeddings.into_iter().map(normalize));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_name_is_minilm() {
        let p = LocalEmbeddingProvider::new();
        assert_eq!(p.model_name(), DEFAULT_MODEL_NAME);
    }

    #[test]
    fn reports_native_384_dimensions() {
        let p = LocalEmbeddingProvider::new();
        assert_eq!(p.dimensions(), 384);
    }
}
