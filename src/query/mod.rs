//! Query processing and ranking module.
//!
//! This module embeds a free-text query with the corpus model, scores it
//! against every cached document vector by cosine similarity and returns the
//! top-k documents.
//!
//! # Usage
//!
//! ```rust,no_run
//! use paper_ideate::corpus;
//! use paper_ideate::embedding::cache::EmbeddingCache;
//! use paper_ideate::embedding::fastembed::FastEmbedProvider;
//! use paper_ideate::query::{SearchEngine, SearchQuery, SemanticFinder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = FastEmbedProvider::default()?;
//! let corpus = corpus::csv::read("data/filtered_papers.csv")?;
//! let vectors = EmbeddingCache::new("data/embeddings.bin").embed(&provider, &corpus).await?;
//!
//! let finder = SemanticFinder::new(&provider, &corpus, &vectors);
//! let query = SearchQuery::new("on-device learning".to_string(), Some(3));
//! for result in finder.search(&query).await? {
//!     println!("{} - Score: {:.3}", result.document.title, result.score);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::corpus::Corpus;
use crate::embedding::cache::EmbeddingSet;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::models::SearchResult;

/// Number of results returned when the caller does not ask for a count.
pub const DEFAULT_TOP_K: usize = 5;

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    /// The query vector cannot be compared with the corpus vectors
    #[error("Query embedding has dimension {found} but corpus vectors have dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    /// Vectors and documents are not positionally aligned
    #[error("{vectors} vectors for {documents} documents")]
    Misaligned { documents: usize, vectors: usize },

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Search query parameters.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// The search query text
    pub query: String,

    /// Maximum number of results to return
    pub top_k: usize,
}

impl SearchQuery {
    /// Create a new search query.
    ///
    /// # Arguments
    /// * `query` - The search query text
    /// * `top_k` - Maximum number of results to return (default: 5)
    pub fn new(query: String, top_k: Option<usize>) -> Self {
        Self {
            query,
            top_k: top_k.unwrap_or(DEFAULT_TOP_K),
        }
    }
}

/// Trait for search and ranking engines.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Execute a search query and return ranked results.
    ///
    /// # Returns
    /// At most `top_k` results, sorted by score (highest first). Ties keep
    /// corpus order.
    ///
    /// # Errors
    /// Returns `QueryError` if the query cannot be embedded or compared
    async fn search(&self, query: &SearchQuery) -> QueryResult<Vec<SearchResult>>;
}

/// Compute cosine similarity between two vectors of equal length.
///
/// Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have the same length");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Brute-force semantic finder over an embedded corpus.
///
/// Borrows the corpus and its vectors; nothing is copied until results are
/// built.
pub struct SemanticFinder<'a, E: EmbeddingProvider + ?Sized> {
    /// Provider used for the corpus vectors
    embedding_provider: &'a E,

    corpus: &'a Corpus,

    vectors: &'a EmbeddingSet,
}

impl<'a, E: EmbeddingProvider + ?Sized> SemanticFinder<'a, E> {
    /// Create a finder.
    ///
    /// # Arguments
    /// * `embedding_provider` - The provider that produced `vectors`
    /// * `corpus` - Documents, row-aligned with `vectors`
    /// * `vectors` - Cached corpus embeddings
    pub fn new(embedding_provider: &'a E, corpus: &'a Corpus, vectors: &'a EmbeddingSet) -> Self {
        Self {
            embedding_provider,
            corpus,
            vectors,
        }
    }

    /// Score every document against an already embedded query.
    pub fn rank(&self, query_embedding: &[f32], top_k: usize) -> QueryResult<Vec<SearchResult>> {
        if self.vectors.len() != self.corpus.len() {
            return Err(QueryError::Misaligned {
                documents: self.corpus.len(),
                vectors: self.vectors.len(),
            });
        }
        if self.vectors.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if query_embedding.len() != self.vectors.dimension() {
            return Err(QueryError::DimensionMismatch {
                expected: self.vectors.dimension(),
                found: query_embedding.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .vectors()
            .iter()
            .map(|v| cosine_similarity(query_embedding, v))
            .enumerate()
            .collect();

        // Stable sort keeps corpus order on exact ties
        scored.sort_by(|a, b| rank_key(b.1).total_cmp(&rank_key(a.1)));
        scored.truncate(top_k);

        let documents = self.corpus.documents();
        Ok(scored
            .into_iter()
            .map(|(index, score)| SearchResult::new(index, documents[index].clone(), score))
            .collect())
    }
}

/// NaN scores rank below every real score; `-0.0` ties with `0.0`.
fn rank_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score + 0.0
    }
}

#[async_trait]
impl<'a, E> SearchEngine for SemanticFinder<'a, E>
where
    E: EmbeddingProvider + ?Sized,
{
    async fn search(&self, query: &SearchQuery) -> QueryResult<Vec<SearchResult>> {
        if query.query.trim().is_empty() {
            return Err(QueryError::InvalidQuery("Query text cannot be empty".to_string()));
        }
        if self.corpus.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedding_provider.embed(&query.query).await?;
        let results = self.rank(&query_embedding, query.top_k)?;
        debug!("Query '{}' returned {} results", query.query, results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::tests::doc;
    use crate::embedding::cache::tests::HashingProvider;
    use crate::models::{EmbeddingConfig, RelevanceLevel};

    // Returns the same vector for every text
    struct FixedProvider {
        vector: Vec<f32>,
        should_fail: bool,
    }

    impl FixedProvider {
        fn new(vector: Vec<f32>) -> Self {
            Self {
                vector,
                should_fail: false,
            }
        }

        fn with_failure() -> Self {
            Self {
                vector: vec![1.0, 0.0, 0.0],
                should_fail: true,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if self.should_fail {
                return Err(EmbeddingError::ModelUnavailable("Mock embedding failure".to_string()));
            }
            Ok(self.vector.clone())
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let mut results = Vec::new();
            for text in texts {
                results.push(self.embed(text).await?);
            }
            Ok(results)
        }

        fn dimension(&self) -> usize {
            self.vector.len()
        }

        fn model_name(&self) -> &str {
            "fixed-mock"
        }
    }

    fn corpus_with(vectors: Vec<Vec<f32>>) -> (Corpus, EmbeddingSet) {
        let documents = (0..vectors.len())
            .map(|i| doc(&format!("Paper {}", i), "Test abstract"))
            .collect();
        let dimension = vectors.first().map_or(0, |v| v.len());
        let set = EmbeddingSet::new(
            EmbeddingConfig {
                model_name: "fixed-mock".to_string(),
                dimension,
            },
            vectors,
        )
        .unwrap();
        (Corpus::new(documents), set)
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 0.0).abs() < 1e-6);

        let a = vec![1.0, 1.0];
        let b = vec![-1.0, -1.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_search_query_defaults() {
        let query = SearchQuery::new("test query".to_string(), None);
        assert_eq!(query.top_k, 5);
    }

    #[tokio::test]
    async fn test_basic_search_with_sorting() {
        let (corpus, vectors) = corpus_with(vec![
            vec![0.0, 1.0, 0.0],
            vec![0.8, 0.6, 0.0],
            vec![1.0, 0.0, 0.0],
        ]);
        let provider = FixedProvider::new(vec![1.0, 0.0, 0.0]);
        let finder = SemanticFinder::new(&provider, &corpus, &vectors);

        let results = finder
            .search(&SearchQuery::new("test query".to_string(), Some(3)))
            .await
            .unwrap();

        let order: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![2, 1, 0]);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(results[0].document.title, "Paper 2");
    }

    #[tokio::test]
    async fn test_top_k_truncation_and_overflow() {
        let (corpus, vectors) = corpus_with(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.9, 0.1, 0.0],
            vec![0.8, 0.2, 0.0],
            vec![0.7, 0.3, 0.0],
            vec![0.6, 0.4, 0.0],
        ]);
        let provider = FixedProvider::new(vec![1.0, 0.0, 0.0]);
        let finder = SemanticFinder::new(&provider, &corpus, &vectors);

        let results = finder.search(&SearchQuery::new("test".to_string(), Some(2))).await.unwrap();
        assert_eq!(results.len(), 2);

        let results = finder.search(&SearchQuery::new("test".to_string(), Some(50))).await.unwrap();
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_nan_scores_rank_last() {
        let (corpus, vectors) = corpus_with(vec![
            vec![f32::NAN, 0.0],
            vec![1.0, 0.0],
            vec![0.5, 0.5],
        ]);
        let provider = FixedProvider::new(vec![1.0, 0.0]);
        let finder = SemanticFinder::new(&provider, &corpus, &vectors);

        let results = finder.rank(&[1.0, 0.0], 3).unwrap();
        let order: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert!(results[2].score.is_nan());
    }

    #[tokio::test]
    async fn test_ties_keep_corpus_order() {
        let (corpus, vectors) = corpus_with(vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![3.0, 0.0],
        ]);
        let provider = FixedProvider::new(vec![1.0, 0.0]);
        let finder = SemanticFinder::new(&provider, &corpus, &vectors);

        let results = finder.search(&SearchQuery::new("tie".to_string(), Some(3))).await.unwrap();
        let order: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_scores_match_recomputed_similarity() {
        let provider = HashingProvider::new(64);
        let corpus = Corpus::new(vec![
            doc("Federated learning", "privacy preserving training on phones"),
            doc("Tactile grasping", "robot hands with touch sensing"),
            doc("Emotion recognition", "wearable physiological signals"),
            doc("Tiny language models", "on-device inference for phones"),
        ]);
        let texts = corpus.texts();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = EmbeddingSet::new(
            EmbeddingConfig {
                model_name: provider.model_name().to_string(),
                dimension: 64,
            },
            provider.embed_batch(&refs).await.unwrap(),
        )
        .unwrap();

        let finder = SemanticFinder::new(&provider, &corpus, &vectors);
        let query = "learning on phones";
        let results = finder.search(&SearchQuery::new(query.to_string(), Some(3))).await.unwrap();
        assert_eq!(results.len(), 3);

        let query_vec = provider.embed(query).await.unwrap();
        for result in &results {
            let expected = cosine_similarity(&query_vec, &vectors.vectors()[result.index]);
            assert!((result.score - expected).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_verbatim_title_is_top_hit() {
        let provider = HashingProvider::new(256);
        let corpus = Corpus::new(vec![
            doc("Robotic grasping with tactile skin sensors", "Manipulation."),
            doc("Sparse attention for long context language models", "Transformers."),
            doc("Energy harvesting wearable patches for continuous health monitoring", "Sensing."),
        ]);
        let texts = corpus.texts();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = EmbeddingSet::new(
            EmbeddingConfig {
                model_name: provider.model_name().to_string(),
                dimension: 256,
            },
            provider.embed_batch(&refs).await.unwrap(),
        )
        .unwrap();

        let finder = SemanticFinder::new(&provider, &corpus, &vectors);
        let results = finder
            .search(&SearchQuery::new(
                "Energy harvesting wearable patches for continuous health monitoring".to_string(),
                Some(1),
            ))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 2);
        assert!(results[0].score >= 0.9);
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_nothing() {
        let (corpus, vectors) = corpus_with(Vec::new());
        let provider = FixedProvider::new(vec![1.0, 0.0, 0.0]);
        let finder = SemanticFinder::new(&provider, &corpus, &vectors);

        let results = finder.search(&SearchQuery::new("test".to_string(), Some(10))).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_error() {
        let (corpus, vectors) = corpus_with(vec![vec![1.0, 0.0, 0.0]]);
        let provider = FixedProvider::new(vec![1.0, 0.0]);
        let finder = SemanticFinder::new(&provider, &corpus, &vectors);

        match finder.search(&SearchQuery::new("test".to_string(), None)).await {
            Err(QueryError::DimensionMismatch { expected, found }) => {
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("Expected DimensionMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_embedding_error_propagation() {
        let (corpus, vectors) = corpus_with(vec![vec![1.0, 0.0, 0.0]]);
        let provider = FixedProvider::with_failure();
        let finder = SemanticFinder::new(&provider, &corpus, &vectors);

        match finder.search(&SearchQuery::new("test".to_string(), None)).await {
            Err(QueryError::EmbeddingError(_)) => {}
            other => panic!("Expected EmbeddingError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let (corpus, vectors) = corpus_with(vec![vec![1.0, 0.0, 0.0]]);
        let provider = FixedProvider::new(vec![1.0, 0.0, 0.0]);
        let finder = SemanticFinder::new(&provider, &corpus, &vectors);

        assert!(matches!(
            finder.search(&SearchQuery::new("   ".to_string(), None)).await,
            Err(QueryError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_relevance_level_assignment() {
        let (corpus, vectors) = corpus_with(vec![vec![1.0, 0.0, 0.0], vec![0.8, 0.6, 0.0]]);
        let provider = FixedProvider::new(vec![1.0, 0.0, 0.0]);
        let finder = SemanticFinder::new(&provider, &corpus, &vectors);

        let results = finder.search(&SearchQuery::new("test".to_string(), Some(10))).await.unwrap();
        assert_eq!(results[0].relevance, RelevanceLevel::Identical);
        assert_eq!(results[1].relevance, RelevanceLevel::Similar);
    }
}
