//! Interactive ideation entry point.
//!
//! Loads the corpus and its cached embeddings, then runs a menu loop for
//! generating ideas, searching for foundational papers and re-clustering.
//!
//! # Examples
//!
//! Interactive session:
//! ```bash
//! ideate
//! ```
//!
//! Single search with JSON output:
//! ```bash
//! ideate --query "wearable emotion recognition" --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use paper_ideate::{
    cluster::ClusterEngine,
    config::Settings,
    corpus,
    embedding::{cache::EmbeddingCache, fastembed::FastEmbedProvider, EmbeddingProvider},
    ideation::IdeaSynthesizer,
    models::{ClusterSummary, RelevanceLevel, SearchResult},
    pipeline::{IdeationPipeline, PipelineStage},
    query::SearchQuery,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for search results
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored relevance levels
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Interactive idea generation over a clustered paper corpus
#[derive(Parser, Debug)]
#[command(
    name = "ideate",
    version,
    about = "Generate research ideas and find foundational papers",
    long_about = "Explore the paper corpus: recombine cluster themes into new research directions, \
                  search for foundational papers by topic and re-run clustering.

EXAMPLES:
  Interactive session:
    ideate

  Reproducible ideas:
    ideate --seed 7

  Single search:
    ideate --query \"tinyml on wearables\" --top-k 10"
)]
struct Args {
    /// Settings file (defaults to ideate.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Filtered corpus table
    #[arg(long, value_name = "FILE")]
    corpus: Option<PathBuf>,

    /// Embedding cache artifact
    #[arg(long, value_name = "FILE")]
    cache: Option<PathBuf>,

    /// Run one search and exit
    #[arg(long, value_name = "TEXT")]
    query: Option<String>,

    /// Number of search results
    #[arg(long, value_name = "N")]
    top_k: Option<usize>,

    /// Seed for idea generation
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Output format for search results
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Format results as a pretty table
fn format_results_table(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Published").add_attribute(Attribute::Bold),
        Cell::new("Relevance").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
        Cell::new("PDF").add_attribute(Attribute::Bold),
    ]);

    for (idx, result) in results.iter().enumerate() {
        let (relevance_str, color) = match result.relevance {
            RelevanceLevel::Identical => ("IDENTICAL", Color::Green),
            RelevanceLevel::HighlySimilar => ("HIGHLY_SIMILAR", Color::Cyan),
            RelevanceLevel::Similar => ("SIMILAR", Color::Yellow),
            RelevanceLevel::Relevant => ("RELEVANT", Color::White),
        };

        table.add_row(vec![
            Cell::new(format!("{}", idx + 1)),
            Cell::new(truncate(&result.document.title, 60)),
            Cell::new(truncate(&result.document.authors, 40)),
            Cell::new(&result.document.published),
            Cell::new(relevance_str).fg(color),
            Cell::new(format!("{:.4}", result.score)),
            Cell::new(&result.document.pdf_url),
        ]);
    }

    table.to_string()
}

/// Format results as JSON
fn format_results_json(results: &[SearchResult]) -> Result<String> {
    serde_json::to_string_pretty(results).with_context(|| "Failed to serialize results to JSON")
}

/// Format cluster summaries as a table
fn format_clusters_table(summaries: &[ClusterSummary]) -> String {
    if summaries.is_empty() {
        return "No clusters found (every paper is noise).".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Cluster").add_attribute(Attribute::Bold),
        Cell::new("Papers").add_attribute(Attribute::Bold),
        Cell::new("High relevance").add_attribute(Attribute::Bold),
        Cell::new("Representative titles").add_attribute(Attribute::Bold),
    ]);

    for summary in summaries {
        let titles = summary
            .titles
            .iter()
            .map(|t| truncate(t, 70))
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(summary.label),
            Cell::new(summary.size),
            Cell::new(summary.high_relevance),
            Cell::new(titles),
        ]);
    }

    table.to_string()
}

fn print_results(results: &[SearchResult], format: &OutputFormat, elapsed: std::time::Duration) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", format_results_table(results));
            println!("\nFound {} results in {:.2}s", results.len(), elapsed.as_secs_f64());
        }
        OutputFormat::Json => println!("{}", format_results_json(results)?),
    }
    Ok(())
}

/// Cluster the corpus and persist the labels
fn recluster<E: EmbeddingProvider>(pipeline: &mut IdeationPipeline<E>, settings: &Settings) -> Result<()> {
    let start = Instant::now();
    pipeline
        .cluster(settings.clustering.min_cluster_size)
        .context("Clustering failed")?;
    pipeline
        .save(&settings.corpus_path)
        .with_context(|| format!("Failed to save corpus to {:?}", settings.corpus_path))?;
    info!("Clustering finished in {:.2?}", start.elapsed());
    Ok(())
}

fn print_menu() {
    println!("\nWhat would you like to do?");
    println!("  1. Generate new ideas (ideate)");
    println!("  2. Find foundational papers (search)");
    println!("  3. Run clustering analysis (cluster)");
    println!("  4. Show clusters (clusters)");
    println!("  5. Exit (exit)");
}

/// Run the interactive menu loop
async fn run_interactive<E: EmbeddingProvider>(
    mut pipeline: IdeationPipeline<E>,
    settings: &Settings,
    mut rng: StdRng,
    format: OutputFormat,
) -> Result<()> {
    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;

    loop {
        print_menu();
        let choice = match rl.readline("> ") {
            Ok(line) => line.trim().to_lowercase(),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        };

        match choice.as_str() {
            "1" | "ideate" => {
                let concept = match rl.readline("Enter a concept or keyword for ideation (optional): ") {
                    Ok(line) => line,
                    Err(_) => continue,
                };

                if pipeline.stage() != PipelineStage::Clustered {
                    println!("Running clustering first...");
                    if let Err(e) = recluster(&mut pipeline, settings) {
                        eprintln!("{:#}", e);
                        continue;
                    }
                }

                match pipeline.ideate(settings.ideation.count, Some(concept.as_str()), &mut rng) {
                    Ok(ideas) => {
                        println!("\nGenerated Ideas:");
                        for (i, idea) in ideas.iter().enumerate() {
                            println!("{}. {}", i + 1, idea.text);
                        }
                    }
                    Err(e) => eprintln!("Ideation failed: {}", e),
                }
            }
            "2" | "search" => {
                let query = match rl.readline("Enter a topic to find foundational papers: ") {
                    Ok(line) => line,
                    Err(_) => continue,
                };
                if query.trim().is_empty() {
                    continue;
                }
                rl.add_history_entry(query.as_str()).ok();

                let start = Instant::now();
                match pipeline
                    .search(&SearchQuery::new(query.clone(), Some(settings.search.top_k)))
                    .await
                {
                    Ok(results) => print_results(&results, &format, start.elapsed())?,
                    Err(e) => eprintln!("Search failed: {}", e),
                }
            }
            "3" | "cluster" => {
                println!("Performing HDBSCAN clustering analysis...");
                match recluster(&mut pipeline, settings) {
                    Ok(()) => println!("Clustering complete. Data updated."),
                    Err(e) => eprintln!("{:#}", e),
                }
            }
            "4" | "clusters" => match pipeline.analyze() {
                Ok(summaries) => println!("{}", format_clusters_table(summaries)),
                Err(e) => eprintln!("{}", e),
            },
            "5" | "exit" | "quit" => break,
            "" => continue,
            other => eprintln!("Unknown choice: {}", other),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level);
    debug!("CLI arguments: {:?}", args);

    let mut settings = Settings::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load settings: {}", e))?;
    if let Some(path) = args.corpus.clone() {
        settings.corpus_path = path;
    }
    if let Some(path) = args.cache.clone() {
        settings.cache_path = path;
    }
    if let Some(top_k) = args.top_k {
        settings.search.top_k = top_k;
    }
    if let Some(seed) = args.seed {
        settings.ideation.seed = Some(seed);
    }

    if !settings.corpus_path.exists() {
        anyhow::bail!(
            "Corpus not found: {}\n\
             Please run the build_cache binary with --raw first.",
            settings.corpus_path.display()
        );
    }

    let corpus = corpus::csv::read(&settings.corpus_path)
        .with_context(|| format!("Failed to read corpus from {:?}", settings.corpus_path))?;
    info!("Loaded {} papers", corpus.len());

    let provider = FastEmbedProvider::from_name(
        &settings.embedding.model,
        settings.embedding.model_cache_dir.clone(),
    )
    .with_context(|| "Failed to create FastEmbed provider")?;

    let mut pipeline = IdeationPipeline::new(
        provider,
        EmbeddingCache::new(&settings.cache_path),
        ClusterEngine::new(settings.clustering.params()),
        corpus,
    )
    .with_synthesizer(IdeaSynthesizer::new(settings.ideation.title_sample));

    pipeline.embed().await.context("Failed to load embeddings")?;

    if let Some(query) = &args.query {
        let start = Instant::now();
        let results = pipeline
            .search(&SearchQuery::new(query.clone(), Some(settings.search.top_k)))
            .await
            .with_context(|| format!("Failed to execute search for query: '{}'", query))?;
        return print_results(&results, &args.format, start.elapsed());
    }

    let rng = match settings.ideation.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    println!("--- Paper Ideate ---");
    run_interactive(pipeline, &settings, rng, args.format).await
}
