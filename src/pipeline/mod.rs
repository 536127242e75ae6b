//! Pipeline coordinator.
//!
//! [`IdeationPipeline`] owns the corpus and everything derived from it and
//! moves it through `filtered → embedded → clustered`. Every operation checks
//! its precondition explicitly and fails with an error that names the missing
//! stage instead of running the stage implicitly.
//!
//! ```ignore
//! let provider = FastEmbedProvider::default()?;
//! let corpus = corpus::csv::read("data/filtered_papers.csv")?;
//! let mut pipeline = IdeationPipeline::new(
//!     provider,
//!     EmbeddingCache::new("data/embeddings.bin"),
//!     ClusterEngine::default(),
//!     corpus,
//! );
//!
//! pipeline.embed().await?;
//! pipeline.cluster(15)?;
//! let ideas = pipeline.ideate(5, Some("federated learning"), &mut rng)?;
//! pipeline.save("data/filtered_papers.csv")?;
//! ```

use std::path::Path;

use rand::Rng;
use thiserror::Error;
use tracing::info;

use crate::cluster::{ClusterEngine, ClusterError};
use crate::corpus::{self, Corpus, CorpusError};
use crate::embedding::cache::{CacheError, EmbeddingCache, EmbeddingSet};
use crate::embedding::EmbeddingProvider;
use crate::ideation::{IdeaSynthesizer, IdeationError};
use crate::models::{ClusterSummary, Idea, SearchResult};
use crate::query::{QueryError, SearchEngine, SearchQuery, SemanticFinder};

/// Broad failure classes, used by callers to decide how to report an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inputs or settings are inconsistent (missing column, dimension mismatch)
    Configuration,

    /// A required earlier stage has not run
    Precondition,

    /// The model, cache or corpus file is unavailable
    Resource,
}

/// Errors surfaced by the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No vectors are loaded yet
    #[error("embeddings required before {0}")]
    EmbeddingsRequired(&'static str),

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Ideation(#[from] IdeationError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::EmbeddingsRequired(_) | PipelineError::Ideation(_) => ErrorKind::Precondition,
            PipelineError::Corpus(CorpusError::IoError(_) | CorpusError::CsvError(_)) => ErrorKind::Resource,
            PipelineError::Corpus(_) => ErrorKind::Configuration,
            PipelineError::Cache(
                CacheError::IoError(_) | CacheError::EncodingError(_) | CacheError::EmbeddingError(_),
            ) => ErrorKind::Resource,
            PipelineError::Cache(_) => ErrorKind::Configuration,
            PipelineError::Cluster(_) => ErrorKind::Configuration,
            PipelineError::Query(QueryError::EmbeddingError(_)) => ErrorKind::Resource,
            PipelineError::Query(_) => ErrorKind::Configuration,
        }
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// How far the corpus has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    /// Documents only
    Filtered,

    /// Vectors are loaded for every document
    Embedded,

    /// Every document has a cluster label
    Clustered,
}

/// Owns a corpus and moves it through the pipeline stages.
pub struct IdeationPipeline<E>
where
    E: EmbeddingProvider,
{
    /// Provider used for corpus and query vectors
    embedding_provider: E,

    cache: EmbeddingCache,

    engine: ClusterEngine,

    synthesizer: IdeaSynthesizer,

    corpus: Corpus,

    vectors: Option<EmbeddingSet>,
}

impl<E> IdeationPipeline<E>
where
    E: EmbeddingProvider,
{
    /// Create a pipeline over `corpus`.
    ///
    /// A corpus loaded with a `cluster` column starts out clustered; vectors are
    /// only loaded by [`embed`](Self::embed).
    pub fn new(embedding_provider: E, cache: EmbeddingCache, engine: ClusterEngine, corpus: Corpus) -> Self {
        Self {
            embedding_provider,
            cache,
            engine,
            synthesizer: IdeaSynthesizer::default(),
            corpus,
            vectors: None,
        }
    }

    /// Use `synthesizer` for ideation instead of the default one.
    pub fn with_synthesizer(mut self, synthesizer: IdeaSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Current stage. Labels take precedence: a corpus restored with its
    /// `cluster` column is `Clustered` even before vectors are loaded.
    pub fn stage(&self) -> PipelineStage {
        if self.corpus.is_clustered() {
            PipelineStage::Clustered
        } else if self.vectors.is_some() {
            PipelineStage::Embedded
        } else {
            PipelineStage::Filtered
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn vectors(&self) -> Option<&EmbeddingSet> {
        self.vectors.as_ref()
    }

    pub fn embedding_provider(&self) -> &E {
        &self.embedding_provider
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Load vectors from the cache, computing them on a miss.
    pub async fn embed(&mut self) -> PipelineResult<&EmbeddingSet> {
        let set = self.cache.embed(&self.embedding_provider, &self.corpus).await?;
        info!("{} embeddings ready (dimension {})", set.len(), set.dimension());
        Ok(&*self.vectors.insert(set))
    }

    /// Cluster the loaded vectors and attach the labels to the corpus.
    ///
    /// # Errors
    /// `EmbeddingsRequired` if [`embed`](Self::embed) has not run.
    pub fn cluster(&mut self, min_cluster_size: usize) -> PipelineResult<&[i32]> {
        let vectors = self
            .vectors
            .as_ref()
            .ok_or(PipelineError::EmbeddingsRequired("clustering"))?;

        let labels = self.engine.cluster(vectors.vectors(), min_cluster_size)?;
        self.corpus.set_labels(labels)?;
        Ok(self.corpus.labels().unwrap_or_default())
    }

    /// Rank documents against a free-text query.
    ///
    /// # Errors
    /// `EmbeddingsRequired` if [`embed`](Self::embed) has not run.
    pub async fn search(&self, query: &SearchQuery) -> PipelineResult<Vec<SearchResult>> {
        let vectors = self
            .vectors
            .as_ref()
            .ok_or(PipelineError::EmbeddingsRequired("search"))?;

        let finder = SemanticFinder::new(&self.embedding_provider, &self.corpus, vectors);
        Ok(finder.search(query).await?)
    }

    /// Summarize the clusters of the labeled corpus.
    pub fn analyze(&mut self) -> PipelineResult<&[ClusterSummary]> {
        Ok(self.synthesizer.analyze(&self.corpus)?)
    }

    /// Analyze the clusters and synthesize `count` ideas.
    ///
    /// # Errors
    /// `Ideation(ClusteringRequired)` if the corpus has no labels.
    pub fn ideate<R>(&mut self, count: usize, concept: Option<&str>, rng: &mut R) -> PipelineResult<Vec<Idea>>
    where
        R: Rng + ?Sized,
    {
        self.synthesizer.analyze(&self.corpus)?;
        Ok(self.synthesizer.synthesize(count, concept, rng))
    }

    /// Persist the corpus, including its labels when clustered.
    pub fn save(&self, path: impl AsRef<Path>) -> PipelineResult<()> {
        corpus::csv::write(&self.corpus, path)?;
        Ok(())
    }
}
