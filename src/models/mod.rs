//! Core data models for the paper ideation system.
//!
//! This module contains the fundamental data structures shared by every stage of
//! the pipeline: paper metadata, search results, cluster summaries and
//! synthesized ideas.

use serde::{Deserialize, Serialize};

/// Cluster label reserved for points that belong to no dense group.
pub const NOISE_LABEL: i32 = -1;

/// Core metadata for a research paper.
///
/// Documents are read-only inputs for the duration of a pipeline run. The `id`
/// is the row position in the corpus table and is the key that keeps vectors,
/// labels and documents aligned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Row index in the corpus table
    pub id: usize,

    /// Paper title
    pub title: String,

    /// Abstract text
    pub summary: String,

    /// Author list as stored in the corpus (free text)
    pub authors: String,

    /// Publication date as stored in the corpus
    pub published: String,

    /// Category codes (e.g. `cs.LG`), empty when the stored field was malformed
    pub categories: Vec<String>,

    /// Whether the paper matched one of the relevance keywords
    pub high_relevance: bool,

    /// Link to the PDF
    pub pdf_url: String,
}

impl Document {
    /// Text submitted to the embedding model for this document.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.title, self.summary)
    }
}

/// Relevance classification for search results.
///
/// Papers are categorized by their semantic similarity to the query,
/// allowing clients to understand the quality of matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelevanceLevel {
    /// Extremely high similarity (cosine similarity > 0.95)
    Identical,

    /// Very high similarity (cosine similarity > 0.85)
    HighlySimilar,

    /// Moderate similarity (cosine similarity > 0.70)
    Similar,

    /// Everything else
    Relevant,
}

impl RelevanceLevel {
    /// Determine relevance level from a cosine similarity score.
    pub fn from_score(score: f32) -> Self {
        if score > 0.95 {
            RelevanceLevel::Identical
        } else if score > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if score > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }
}

/// A single search result containing paper metadata and relevance information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Row index of the paper in the corpus
    pub index: usize,

    /// The paper metadata
    pub document: Document,

    /// Cosine similarity score (-1.0 to 1.0, higher is better)
    pub score: f32,

    /// Categorical relevance classification
    pub relevance: RelevanceLevel,
}

impl SearchResult {
    /// Create a new search result from a document and similarity score.
    pub fn new(index: usize, document: Document, score: f32) -> Self {
        Self {
            index,
            document,
            score,
            relevance: RelevanceLevel::from_score(score),
        }
    }
}

/// Derived statistics for one non-noise cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterSummary {
    /// Cluster label (never [`NOISE_LABEL`])
    pub label: i32,

    /// Number of member documents
    pub size: usize,

    /// First titles of the cluster in table order
    pub titles: Vec<String>,

    /// Number of members flagged high-relevance
    pub high_relevance: usize,
}

/// A synthesized research direction and where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Idea {
    /// The generated statement
    pub text: String,

    /// Source cluster labels and the representative title drawn from each.
    /// Empty for the placeholder returned when no clusters were analyzed.
    pub sources: Vec<(i32, String)>,

    /// User concept that anchored the idea, if any
    pub concept: Option<String>,
}

impl Idea {
    /// True for the instructive placeholder emitted when there is nothing to recombine.
    pub fn is_placeholder(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Configuration for the embedding model.
///
/// Stored alongside the cached vectors so the query-time model can be checked
/// against the model that produced the corpus vectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Name/identifier of the embedding model (e.g., "AllMiniLML6V2")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_level_from_score() {
        assert_eq!(RelevanceLevel::from_score(0.96), RelevanceLevel::Identical);
        assert_eq!(RelevanceLevel::from_score(0.90), RelevanceLevel::HighlySimilar);
        assert_eq!(RelevanceLevel::from_score(0.75), RelevanceLevel::Similar);
        assert_eq!(RelevanceLevel::from_score(0.60), RelevanceLevel::Relevant);
        assert_eq!(RelevanceLevel::from_score(-0.2), RelevanceLevel::Relevant);
    }

    #[test]
    fn test_embedding_text_joins_title_and_summary() {
        let doc = Document {
            id: 0,
            title: "Tiny Models".to_string(),
            summary: "We shrink them.".to_string(),
            authors: String::new(),
            published: String::new(),
            categories: vec![],
            high_relevance: false,
            pdf_url: String::new(),
        };
        assert_eq!(doc.embedding_text(), "Tiny Models We shrink them.");
    }

    #[test]
    fn test_placeholder_idea() {
        let idea = Idea {
            text: "nothing yet".to_string(),
            sources: vec![],
            concept: None,
        };
        assert!(idea.is_placeholder());
    }
}
