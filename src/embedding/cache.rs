//! Persistent embedding cache.
//!
//! Corpus embedding is the most expensive step of the pipeline, so the full
//! vector collection is computed once and stored as a single binary artifact.
//! Presence of the artifact alone decides whether vectors are recomputed: the
//! cache is not keyed by document content, so edits to the corpus require an
//! explicit [`EmbeddingCache::invalidate`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{EmbeddingError, EmbeddingProvider};
use crate::corpus::csv::parent_dir;
use crate::corpus::Corpus;
use crate::models::EmbeddingConfig;

/// Errors that can occur while loading or building the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache location could not be read or written
    #[error("Cache IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The artifact could not be encoded or decoded
    #[error("Cache encoding error: {0}")]
    EncodingError(#[from] bincode::Error),

    /// The model failed while computing vectors
    #[error("Embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    /// The cached collection does not line up with the corpus
    #[error(
        "Cached embeddings at {path} hold {cached} vectors but the corpus has {documents} documents; \
         delete the cache to rebuild it"
    )]
    Misaligned {
        path: PathBuf,
        cached: usize,
        documents: usize,
    },

    /// Vectors in one collection have different lengths
    #[error("Inconsistent vector dimension: expected {expected}, found {found} at index {index}")]
    InconsistentDimension {
        expected: usize,
        found: usize,
        index: usize,
    },
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Vector collection positionally parallel to a corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSet {
    config: EmbeddingConfig,
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingSet {
    /// Build a set, checking that every vector has `config.dimension` entries.
    pub fn new(config: EmbeddingConfig, vectors: Vec<Vec<f32>>) -> CacheResult<Self> {
        if let Some((index, v)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != config.dimension)
        {
            return Err(CacheError::InconsistentDimension {
                expected: config.dimension,
                found: v.len(),
                index,
            });
        }
        Ok(Self { config, vectors })
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Cache of corpus vectors at a fixed location.
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    path: PathBuf,
}

impl EmbeddingCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an artifact is present.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Return vectors for `corpus`, computing and persisting them on a cache miss.
    ///
    /// On a hit the stored collection is returned verbatim without touching the
    /// model. On a miss every document's `"{title} {summary}"` text is encoded
    /// in one batch call and the result is written atomically before returning.
    ///
    /// # Errors
    /// - `CacheError::Misaligned` if a cached collection has a different length
    ///   than the corpus
    /// - `CacheError::EmbeddingError` if the model fails; nothing is written
    /// - `CacheError::IoError` if the cache location is not writable
    pub async fn embed<E>(&self, provider: &E, corpus: &Corpus) -> CacheResult<EmbeddingSet>
    where
        E: EmbeddingProvider + ?Sized,
    {
        if let Some(set) = self.load()? {
            if set.len() != corpus.len() {
                return Err(CacheError::Misaligned {
                    path: self.path.clone(),
                    cached: set.len(),
                    documents: corpus.len(),
                });
            }
            if set.config().model_name != provider.model_name() {
                warn!(
                    "Cached embeddings were produced by {} but the active model is {}",
                    set.config().model_name,
                    provider.model_name()
                );
            }
            return Ok(set);
        }

        info!("Generating embeddings for {} papers", corpus.len());
        let texts = corpus.texts();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = provider.embed_batch(&refs).await?;

        let set = EmbeddingSet::new(
            EmbeddingConfig {
                model_name: provider.model_name().to_string(),
                dimension: provider.dimension(),
            },
            vectors,
        )?;

        self.store(&set)?;
        Ok(set)
    }

    /// Read the artifact if present.
    pub fn load(&self) -> CacheResult<Option<EmbeddingSet>> {
        if !self.exists() {
            debug!("No embedding cache at {}", self.path.display());
            return Ok(None);
        }

        let bytes = fs::read(&self.path)?;
        let decoded: EmbeddingSet = bincode::deserialize(&bytes)?;
        let set = EmbeddingSet::new(decoded.config, decoded.vectors)?;
        info!(
            "Loaded {} cached embeddings from {}",
            set.len(),
            self.path.display()
        );
        Ok(Some(set))
    }

    /// Write the artifact, replacing any previous one as a whole.
    pub fn store(&self, set: &EmbeddingSet) -> CacheResult<()> {
        let dir = parent_dir(&self.path);
        fs::create_dir_all(&dir)?;

        let bytes = bincode::serialize(set)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| CacheError::IoError(e.error))?;

        info!("Cached {} embeddings at {}", set.len(), self.path.display());
        Ok(())
    }

    /// Remove the artifact so the next [`embed`](Self::embed) recomputes.
    pub fn invalidate(&self) -> CacheResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed embedding cache {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::corpus::tests::doc;
    use crate::embedding::EmbeddingResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Bag-of-words hashing model: deterministic and cheap.
    pub(crate) struct HashingProvider {
        pub dimension: usize,
        pub batch_calls: AtomicUsize,
        pub fail: bool,
    }

    impl HashingProvider {
        pub(crate) fn new(dimension: usize) -> Self {
            Self {
                dimension,
                batch_calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(8)
            }
        }

        fn vectorize(&self, text: &str) -> Vec<f32> {
            let mut v = vec![0.0; self.dimension];
            for token in text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
            {
                let mut hash: u64 = 0xcbf29ce484222325;
                for b in token.to_lowercase().bytes() {
                    hash ^= b as u64;
                    hash = hash.wrapping_mul(0x100000001b3);
                }
                v[(hash % self.dimension as u64) as usize] += 1.0;
            }
            v
        }
    }

    #[async_trait]
    impl EmbeddingProvider for HashingProvider {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            if self.fail {
                return Err(EmbeddingError::ModelUnavailable("mock model offline".to_string()));
            }
            Ok(self.vectorize(text))
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbeddingError::ModelUnavailable("mock model offline".to_string()));
            }
            Ok(texts.iter().map(|t| self.vectorize(t)).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "hashing-mock"
        }
    }

    fn sample_corpus() -> Corpus {
        Corpus::new(vec![
            doc("Edge inference", "on tiny devices"),
            doc("Emotion recognition", "from wearable sensors"),
            doc("Robot grasping", "with tactile feedback"),
        ])
    }

    #[tokio::test]
    async fn test_second_embed_is_cache_hit_and_identical() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("sub").join("embeddings.bin"));
        let provider = HashingProvider::new(16);
        let corpus = sample_corpus();

        let first = cache.embed(&provider, &corpus).await.unwrap();
        assert!(cache.exists());
        let second = cache.embed(&provider, &corpus).await.unwrap();

        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(first.len(), corpus.len());
        assert_eq!(first.dimension(), 16);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_model_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("embeddings.bin"));
        let corpus = sample_corpus();
        cache.embed(&HashingProvider::new(8), &corpus).await.unwrap();

        let offline = HashingProvider::failing();
        let set = cache.embed(&offline, &corpus).await.unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(offline.batch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("embeddings.bin"));

        let result = cache.embed(&HashingProvider::failing(), &sample_corpus()).await;
        assert!(matches!(result, Err(CacheError::EmbeddingError(_))));
        assert!(!cache.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_misaligned_cache_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("embeddings.bin"));
        let provider = HashingProvider::new(8);
        cache.embed(&provider, &sample_corpus()).await.unwrap();

        let smaller = Corpus::new(vec![doc("Only one", "paper")]);
        match cache.embed(&provider, &smaller).await {
            Err(CacheError::Misaligned {
                cached, documents, ..
            }) => {
                assert_eq!(cached, 3);
                assert_eq!(documents, 1);
            }
            other => panic!("Expected Misaligned, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalidate_forces_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("embeddings.bin"));
        let provider = HashingProvider::new(8);
        let corpus = sample_corpus();

        cache.embed(&provider, &corpus).await.unwrap();
        assert!(cache.invalidate().unwrap());
        assert!(!cache.invalidate().unwrap());
        cache.embed(&provider, &corpus).await.unwrap();
        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blank_document_keeps_its_position() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("embeddings.bin"));
        let provider = HashingProvider::new(16);
        let corpus = Corpus::new(vec![
            doc("Edge inference", "on tiny devices"),
            doc("", ""),
            doc("Robot grasping", "with tactile feedback"),
        ]);
        assert_eq!(corpus.texts()[1], " ");

        let set = cache.embed(&provider, &corpus).await.unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.vectors()[1].iter().all(|&x| x == 0.0));
        assert!(set.vectors()[0].iter().any(|&x| x != 0.0));
        assert!(set.vectors()[2].iter().any(|&x| x != 0.0));
        assert!(cache.exists());
    }

    #[test]
    fn test_corrupted_artifact_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("embeddings.bin"));
        let corrupted = EmbeddingSet {
            config: EmbeddingConfig {
                model_name: "m".to_string(),
                dimension: 3,
            },
            vectors: vec![vec![1.0, 0.0, 0.0], vec![0.5]],
        };
        fs::write(cache.path(), bincode::serialize(&corrupted).unwrap()).unwrap();

        assert!(matches!(
            cache.load(),
            Err(CacheError::InconsistentDimension {
                expected: 3,
                found: 1,
                index: 1
            })
        ));
    }

    #[test]
    fn test_embedding_set_checks_dimension() {
        let config = EmbeddingConfig {
            model_name: "m".to_string(),
            dimension: 2,
        };
        let err = EmbeddingSet::new(config, vec![vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            CacheError::InconsistentDimension {
                expected: 2,
                found: 1,
                index: 1
            }
        ));
    }
}
