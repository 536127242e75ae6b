//! Paper Ideate - an idea space over a corpus of research papers.
//!
//! This library embeds paper metadata into a semantic vector space, groups the
//! papers into topical clusters, answers free-text nearest-neighbor queries and
//! recombines cluster themes into new research directions.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Document, SearchResult, ClusterSummary, Idea)
//! - **corpus**: The paper table, CSV persistence and category/keyword filtering
//! - **embedding**: Embedding providers and the on-disk vector cache
//! - **cluster**: UMAP reduction followed by HDBSCAN clustering
//! - **query**: Cosine-similarity search and ranking
//! - **ideation**: Cluster summaries and idea synthesis
//! - **pipeline**: Stage tracking with explicit preconditions
//! - **config**: Layered settings
//!
//! # Workflow
//!
//! ## Offline Build
//!
//! 1. Filter a raw paper table by category and flag keyword matches
//! 2. Embed every paper's title and summary (cached after the first run)
//! 3. Cluster the vectors and persist the labels with the corpus
//!
//! ## Interactive Session
//!
//! 1. Load the labeled corpus and cached vectors
//! 2. Search by free text, or
//! 3. Draw pairs of clusters and recombine their representative titles
//!
//! # Example
//!
//! ```ignore
//! use paper_ideate::{
//!     cluster::ClusterEngine,
//!     corpus,
//!     embedding::{cache::EmbeddingCache, fastembed::FastEmbedProvider},
//!     pipeline::IdeationPipeline,
//!     query::SearchQuery,
//! };
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut pipeline = IdeationPipeline::new(
//!         FastEmbedProvider::default()?,
//!         EmbeddingCache::new("data/embeddings.bin"),
//!         ClusterEngine::default(),
//!         corpus::csv::read("data/filtered_papers.csv")?,
//!     );
//!
//!     pipeline.embed().await?;
//!     pipeline.cluster(15)?;
//!
//!     let query = SearchQuery::new("tinyml on wearables".to_string(), Some(3));
//!     for result in pipeline.search(&query).await? {
//!         println!("{}: {}", result.document.title, result.score);
//!     }
//!
//!     let mut rng = StdRng::seed_from_u64(7);
//!     for idea in pipeline.ideate(5, Some("federated learning"), &mut rng)? {
//!         println!("{}", idea.text);
//!     }
//!     Ok(())
//! }
//! ```

// Public modules
pub mod cluster;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod ideation;
pub mod models;
pub mod pipeline;
pub mod query;

// Re-export commonly used types at the crate root
pub use cluster::{ClusterEngine, ClusterParams};
pub use corpus::Corpus;
pub use embedding::EmbeddingProvider;
pub use ideation::IdeaSynthesizer;
pub use models::{ClusterSummary, Document, EmbeddingConfig, Idea, RelevanceLevel, SearchResult, NOISE_LABEL};
pub use pipeline::{ErrorKind, IdeationPipeline, PipelineError, PipelineStage};
pub use query::{SearchEngine, SearchQuery};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model name
pub const DEFAULT_EMBEDDING_MODEL: &str = "AllMiniLML6V2";

/// Default embedding dimension for AllMiniLML6V2
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Default minimum number of papers in a cluster
pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 15;
