//! Offline build entry point.
//!
//! Optionally filters a raw paper table, then embeds the corpus (reusing the
//! cache when present), clusters it and writes the labels back with the corpus.
//!
//! # Examples
//!
//! Filter a raw dump and build everything:
//! ```bash
//! build_cache --raw data/raw_papers.csv
//! ```
//!
//! Re-cluster an already embedded corpus with smaller clusters:
//! ```bash
//! build_cache --min-cluster-size 8
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paper_ideate::{
    cluster::ClusterEngine,
    config::Settings,
    corpus,
    embedding::{cache::EmbeddingCache, fastembed::FastEmbedProvider, EmbeddingProvider},
    pipeline::IdeationPipeline,
    NOISE_LABEL,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Build the embedding cache and cluster labels for a paper corpus
#[derive(Parser, Debug)]
#[command(
    name = "build_cache",
    version,
    about = "Embed and cluster the paper corpus",
    long_about = "Offline build: filter a raw paper table (optional), embed every paper, cluster the vectors and persist the labels with the corpus.

EXAMPLES:
  Filter a raw dump and build everything:
    build_cache --raw data/raw_papers.csv

  Re-cluster with a smaller minimum cluster size:
    build_cache --min-cluster-size 8

  Force new embeddings after editing the corpus:
    build_cache --rebuild --log-level debug"
)]
struct BuildArgs {
    /// Settings file (defaults to ideate.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Raw paper table to filter into the corpus before embedding
    #[arg(long, value_name = "FILE")]
    raw: Option<PathBuf>,

    /// Filtered corpus table
    #[arg(long, value_name = "FILE")]
    corpus: Option<PathBuf>,

    /// Embedding cache artifact
    #[arg(long, value_name = "FILE")]
    cache: Option<PathBuf>,

    /// Minimum number of papers per cluster
    #[arg(long, value_name = "N")]
    min_cluster_size: Option<usize>,

    /// Embedding model name
    #[arg(long, value_name = "MODEL")]
    embedding_model: Option<String>,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    model_cache_dir: Option<PathBuf>,

    /// Discard the embedding cache and recompute every vector
    #[arg(long)]
    rebuild: bool,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Merge CLI flags over the loaded settings
fn load_settings(args: &BuildArgs) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load settings: {}", e))?;

    if let Some(path) = &args.corpus {
        settings.corpus_path = path.clone();
    }
    if let Some(path) = &args.cache {
        settings.cache_path = path.clone();
    }
    if let Some(n) = args.min_cluster_size {
        settings.clustering.min_cluster_size = n;
    }
    if let Some(model) = &args.embedding_model {
        settings.embedding.model = model.clone();
    }
    if let Some(dir) = &args.model_cache_dir {
        settings.embedding.model_cache_dir = Some(dir.clone());
    }
    Ok(settings)
}

/// Create the embedding provider named in the settings
fn create_embedding_provider(settings: &Settings) -> Result<FastEmbedProvider> {
    info!("Initializing FastEmbed provider");

    let cache_dir = settings.embedding.model_cache_dir.clone().unwrap_or_else(|| {
        dirs::cache_dir()
            .map(|p| p.join("fastembed"))
            .unwrap_or_else(|| PathBuf::from(".cache/fastembed"))
    });
    debug!("Using model cache directory: {}", cache_dir.display());

    let provider = FastEmbedProvider::from_name(&settings.embedding.model, Some(cache_dir))
        .context("Failed to initialize FastEmbed provider")?;

    info!(
        "FastEmbed provider initialized: model={}, dimension={}",
        provider.model_name(),
        provider.dimension()
    );
    Ok(provider)
}

/// Create a spinner for a long-running stage
fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("[{elapsed_precise}] {spinner:.cyan} {msg}")
            .expect("Invalid progress bar template"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = BuildArgs::parse();

    init_logging(&args.log_level).context("Failed to initialize logging")?;

    info!("Starting corpus build");
    debug!("CLI arguments: {:?}", args);

    let start_time = Instant::now();
    let settings = load_settings(&args)?;
    let cache = EmbeddingCache::new(&settings.cache_path);

    let corpus = match &args.raw {
        Some(raw) => {
            info!("Filtering raw papers from {:?}", raw);
            let raw_corpus = corpus::csv::read_raw(raw)
                .with_context(|| format!("Failed to read raw papers from {:?}", raw))?;
            let filtered = settings.filter.apply(raw_corpus);
            corpus::csv::write(&filtered, &settings.corpus_path)
                .with_context(|| format!("Failed to write corpus to {:?}", settings.corpus_path))?;

            // Cached vectors belong to the previous corpus
            if cache.invalidate().context("Failed to remove stale embedding cache")? {
                info!("Removed embeddings of the previous corpus");
            }
            filtered
        }
        None => corpus::csv::read(&settings.corpus_path)
            .with_context(|| format!("Failed to read corpus from {:?}", settings.corpus_path))?,
    };

    if corpus.is_empty() {
        warn!("Corpus is empty; nothing to embed");
        return Ok(());
    }
    let high_relevance = corpus.documents().iter().filter(|d| d.high_relevance).count();
    info!("Corpus has {} papers ({} high relevance)", corpus.len(), high_relevance);

    if args.rebuild && cache.invalidate().context("Failed to remove embedding cache")? {
        info!("Discarded embedding cache at {:?}", settings.cache_path);
    }

    let cache_hit = cache.exists();
    let provider = create_embedding_provider(&settings)?;
    let mut pipeline = IdeationPipeline::new(
        provider,
        cache,
        ClusterEngine::new(settings.clustering.params()),
        corpus,
    );

    let spinner = create_spinner(format!("Embedding {} papers", pipeline.corpus().len()));
    let dimension = pipeline
        .embed()
        .await
        .context("Failed to embed corpus")?
        .dimension();
    spinner.finish_with_message(if cache_hit { "Embeddings loaded from cache" } else { "Embeddings computed" });

    let spinner = create_spinner("Clustering".to_string());
    let labels = pipeline
        .cluster(settings.clustering.min_cluster_size)
        .context("Failed to cluster corpus")?
        .to_vec();
    spinner.finish_with_message("Clustering done");

    pipeline
        .save(&settings.corpus_path)
        .with_context(|| format!("Failed to save corpus to {:?}", settings.corpus_path))?;

    let clusters = labels.iter().copied().max().map_or(0, |m| m + 1).max(0);
    let noise = labels.iter().filter(|&&l| l == NOISE_LABEL).count();

    let elapsed = start_time.elapsed();
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Build Completed                   ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Papers:               {:>16} ║", labels.len());
    println!("║ High relevance:       {:>16} ║", high_relevance);
    println!("║ Embedding dimension:  {:>16} ║", dimension);
    println!("║ Clusters:             {:>16} ║", clusters);
    println!("║ Noise papers:         {:>16} ║", noise);
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");

    info!("Corpus build completed successfully");

    Ok(())
}
