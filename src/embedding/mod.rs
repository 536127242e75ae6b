//! Embedding provider abstraction, local model and vector cache.
//!
//! This module defines the interface for text embedding generation, the
//! fastembed-backed local implementation, and the on-disk cache that makes
//! corpus embedding a one-time cost.
//!
//! The same provider instance (or one with an identical configuration) must be
//! used for the corpus and for queries, otherwise similarities are meaningless.

pub mod cache;
pub mod fastembed;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The model could not be loaded or failed while running
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Invalid input text (e.g., empty)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., unknown model name)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementors turn text into fixed-dimension vectors. The trait is async so
/// that blocking model calls can be serialized behind an async lock.
///
/// # Example Usage
/// ```ignore
/// let provider = FastEmbedProvider::default()?;
/// let vectors = provider.embed_batch(&["Edge inference", "Wearable sensing"]).await?;
/// assert_eq!(vectors[0].len(), provider.dimension());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the embedding generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts in a single batch.
    ///
    /// Blank texts are encoded like any other text so that corpus rows with
    /// missing fields keep their position.
    ///
    /// # Returns
    /// A vector of embedding vectors, in the same order as the input texts
    ///
    /// # Errors
    /// Returns `EmbeddingError` if any embedding generation fails; no partial
    /// output is returned
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Number of dimensions in the produced vectors.
    fn dimension(&self) -> usize;

    /// Identifier of the embedding model (e.g., "AllMiniLML6V2").
    fn model_name(&self) -> &str;
}
