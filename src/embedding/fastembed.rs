//! FastEmbed embedding provider implementation.
//!
//! This module provides an implementation of the `EmbeddingProvider` trait
//! using the fastembed library, which runs sentence-transformer models locally
//! through ONNX Runtime. Model weights are downloaded on first use into the
//! configured cache directory.

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Model used when the configuration does not name one.
pub const DEFAULT_MODEL: EmbeddingModel = EmbeddingModel::AllMiniLML6V2;

/// Map a configuration string to a supported fastembed model.
///
/// Accepts the enum-style names used in settings files (`AllMiniLML6V2`) as
/// well as the usual hub identifiers (`all-MiniLM-L6-v2`, `BAAI/bge-small-en-v1.5`).
pub fn parse_model_name(name: &str) -> EmbeddingResult<EmbeddingModel> {
    let key: String = name
        .rsplit('/')
        .next()
        .unwrap_or(name)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    match key.as_str() {
        "allminilml6v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bgesmallenv15" => Ok(EmbeddingModel::BGESmallENV15),
        "bgebaseenv15" => Ok(EmbeddingModel::BGEBaseENV15),
        "bgelargeenv15" => Ok(EmbeddingModel::BGELargeENV15),
        "nomicembedtextv1" => Ok(EmbeddingModel::NomicEmbedTextV1),
        "nomicembedtextv15" => Ok(EmbeddingModel::NomicEmbedTextV15),
        "paraphrasemlminilml12v2" | "paraphrasemultilingualminilml12v2" => {
            Ok(EmbeddingModel::ParaphraseMLMiniLML12V2)
        }
        "paraphrasemlmpnetbasev2" | "paraphrasemultilingualmpnetbasev2" => {
            Ok(EmbeddingModel::ParaphraseMLMpnetBaseV2)
        }
        _ => Err(EmbeddingError::ConfigError(format!(
            "Unsupported embedding model '{}'",
            name
        ))),
    }
}

/// Output dimension of a supported model.
pub fn model_dimension(model: &EmbeddingModel) -> usize {
    match model {
        EmbeddingModel::AllMiniLML6V2 => 384,
        EmbeddingModel::BGESmallENV15 => 384,
        EmbeddingModel::BGEBaseENV15 => 768,
        EmbeddingModel::BGELargeENV15 => 1024,
        EmbeddingModel::NomicEmbedTextV1 => 768,
        EmbeddingModel::NomicEmbedTextV15 => 768,
        EmbeddingModel::ParaphraseMLMiniLML12V2 => 384,
        EmbeddingModel::ParaphraseMLMpnetBaseV2 => 768,
        _ => 384,
    }
}

/// FastEmbed embedding provider.
///
/// Holds the loaded model behind an async mutex so the provider can be shared
/// between the corpus cache and the query path.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// The embedding model instance (wrapped in Arc<Mutex> for thread-safety)
    model: Arc<Mutex<TextEmbedding>>,

    /// Model identifier
    model_name: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed embedding provider.
    ///
    /// # Arguments
    /// * `model` - Optional model to use (defaults to AllMiniLML6V2)
    /// * `cache_dir` - Optional cache directory for model files
    ///
    /// # Errors
    /// Returns `EmbeddingError::ModelUnavailable` if the weights cannot be
    /// loaded or downloaded
    pub fn new(model: Option<EmbeddingModel>, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let model_type = model.unwrap_or(DEFAULT_MODEL);
        let model_name = format!("{:?}", model_type);
        let embedding_dimension = model_dimension(&model_type);

        let mut init_options = InitOptions::new(model_type);
        if let Some(dir) = cache_dir {
            debug!("Using model cache directory: {}", dir.display());
            init_options = init_options.with_cache_dir(dir);
        }

        let text_embedding = TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ModelUnavailable(format!("Failed to initialize FastEmbed model: {}", e))
        })?;

        info!(
            "Loaded embedding model {} (dimension {})",
            model_name, embedding_dimension
        );

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            embedding_dimension,
        })
    }

    /// Create a provider from a configuration model name.
    pub fn from_name(name: &str, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        Self::new(Some(parse_model_name(name)?), cache_dir)
    }

    /// Create a new FastEmbed provider with default settings.
    pub fn default() -> EmbeddingResult<Self> {
        Self::new(None, None)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }

        let mut model = self.model.lock().await;

        let embeddings = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::ModelUnavailable(format!("Embedding generation failed: {}", e)))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let blank = texts.iter().filter(|t| t.trim().is_empty()).count();
        if blank > 0 {
            debug!("Encoding {} blank texts", blank);
        }

        let mut model = self.model.lock().await;

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        // fastembed batches internally and returns vectors in input order
        let embeddings = model
            .embed(text_strings, None)
            .map_err(|e| EmbeddingError::ModelUnavailable(format!("Batch embedding generation failed: {}", e)))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::Other(format!(
                "Model returned {} vectors for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// TextEmbedding does not implement Debug
impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}
