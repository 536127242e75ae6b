//! Cluster-driven idea synthesis.
//!
//! [`IdeaSynthesizer::analyze`] summarizes each non-noise cluster of a labeled
//! corpus; [`IdeaSynthesizer::synthesize`] then recombines representative
//! titles from randomly drawn clusters into research directions. Randomness is
//! always supplied by the caller so a seeded generator reproduces the output.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::corpus::Corpus;
use crate::models::{ClusterSummary, Idea, NOISE_LABEL};

/// Titles kept per cluster when none is configured.
pub const DEFAULT_TITLE_SAMPLE: usize = 5;

/// Text of the idea returned when no cluster has been analyzed.
pub const PLACEHOLDER_IDEA: &str = "Analyze data first to identify clusters.";

/// Errors that can occur during ideation.
#[derive(Debug, Error)]
pub enum IdeationError {
    /// The corpus carries no cluster labels
    #[error("clustering required before synthesis")]
    ClusteringRequired,
}

/// Result type for ideation operations.
pub type IdeationResult<T> = Result<T, IdeationError>;

/// Summarizes clusters and recombines them into ideas.
#[derive(Debug, Clone)]
pub struct IdeaSynthesizer {
    summaries: Vec<ClusterSummary>,
    title_sample: usize,
}

impl Default for IdeaSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE_SAMPLE)
    }
}

impl IdeaSynthesizer {
    /// Create a synthesizer keeping up to `title_sample` titles per cluster (at least one).
    pub fn new(title_sample: usize) -> Self {
        Self {
            summaries: Vec::new(),
            title_sample: title_sample.max(1),
        }
    }

    /// Summaries from the last successful [`analyze`](Self::analyze).
    pub fn summaries(&self) -> &[ClusterSummary] {
        &self.summaries
    }

    /// Summarize every non-noise cluster of `corpus`.
    ///
    /// Clusters are listed in order of first appearance in the table; sampled
    /// titles are the first members in table order.
    ///
    /// # Errors
    /// `IdeationError::ClusteringRequired` if the corpus has no labels.
    pub fn analyze(&mut self, corpus: &Corpus) -> IdeationResult<&[ClusterSummary]> {
        let labels = corpus.labels().ok_or(IdeationError::ClusteringRequired)?;

        let mut summaries: Vec<ClusterSummary> = Vec::new();
        for (document, &label) in corpus.documents().iter().zip(labels) {
            if label == NOISE_LABEL {
                continue;
            }
            let pos = match summaries.iter().position(|s| s.label == label) {
                Some(pos) => pos,
                None => {
                    summaries.push(ClusterSummary {
                        label,
                        size: 0,
                        titles: Vec::new(),
                        high_relevance: 0,
                    });
                    summaries.len() - 1
                }
            };

            let summary = &mut summaries[pos];
            summary.size += 1;
            if summary.titles.len() < self.title_sample {
                summary.titles.push(document.title.clone());
            }
            if document.high_relevance {
                summary.high_relevance += 1;
            }
        }

        info!("Analyzed {} clusters", summaries.len());
        self.summaries = summaries;
        Ok(&self.summaries)
    }

    /// Generate `count` ideas, optionally anchored to `concept`.
    ///
    /// Each idea draws two clusters uniformly with replacement, then one
    /// sampled title from each. A blank concept counts as none. With no
    /// analyzed clusters a single placeholder idea is returned.
    pub fn synthesize<R>(&self, count: usize, concept: Option<&str>, rng: &mut R) -> Vec<Idea>
    where
        R: Rng + ?Sized,
    {
        if self.summaries.is_empty() {
            return vec![Idea {
                text: PLACEHOLDER_IDEA.to_string(),
                sources: Vec::new(),
                concept: None,
            }];
        }

        let concept = concept.map(str::trim).filter(|c| !c.is_empty());

        let ideas: Vec<Idea> = (0..count)
            .filter_map(|_| {
                let first = self.summaries.choose(rng)?;
                let second = self.summaries.choose(rng)?;
                let t1 = first.titles.choose(rng)?;
                let t2 = second.titles.choose(rng)?;

                let text = match concept {
                    Some(c) => format!(
                        "Integrating '{}' with the principles of '{}' and '{}' to create a future-proof research direction.",
                        c, t1, t2
                    ),
                    None => format!(
                        "Cross-pollinating '{}' and '{}' for next-generation research innovation.",
                        t1, t2
                    ),
                };

                Some(Idea {
                    text,
                    sources: vec![(first.label, t1.clone()), (second.label, t2.clone())],
                    concept: concept.map(str::to_string),
                })
            })
            .collect();

        debug!("Synthesized {} ideas", ideas.len());
        ideas
    }
}
