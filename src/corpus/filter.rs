//! Category and keyword filtering of a raw paper dataset.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::Corpus;
use crate::models::Document;

/// arXiv categories kept by default.
pub const DEFAULT_CATEGORIES: [&str; 8] = [
    "cs.AI", "cs.LG", "cs.HC", "cs.RO", "cs.CV", "cs.CL", "eess.SP", "cs.AR",
];

/// Keywords that mark a paper as high-relevance by default.
pub const DEFAULT_KEYWORDS: [&str; 11] = [
    "edge",
    "wearable",
    "emotion",
    "personalization",
    "on-device",
    "tinyml",
    "neuromorphic",
    "federated",
    "context-aware",
    "multimodal",
    "low-power",
];

/// Selects papers by category and flags the ones mentioning a keyword.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusFilter {
    /// A paper is kept when any of its categories is in this list
    pub categories: Vec<String>,

    /// Case-insensitive substrings searched in title and summary
    pub keywords: Vec<String>,
}

impl Default for CorpusFilter {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl CorpusFilter {
    pub fn new(categories: Vec<String>, keywords: Vec<String>) -> Self {
        Self {
            categories,
            keywords,
        }
    }

    /// Keep matching papers and recompute `high_relevance`.
    ///
    /// Row ids are renumbered and any cluster column is dropped, since labels
    /// computed on the unfiltered table no longer line up.
    pub fn apply(&self, corpus: Corpus) -> Corpus {
        let total = corpus.len();
        let keywords: Vec<String> = self.keywords.iter().map(|k| k.to_lowercase()).collect();

        let kept: Vec<Document> = corpus
            .into_documents()
            .into_iter()
            .filter(|doc| self.matches_category(doc))
            .map(|mut doc| {
                let text = format!("{} {}", doc.title, doc.summary).to_lowercase();
                doc.high_relevance = keywords.iter().any(|kw| text.contains(kw.as_str()));
                doc
            })
            .collect();

        let relevant = kept.iter().filter(|d| d.high_relevance).count();
        info!(
            "Filtered {} papers down to {} ({} high relevance)",
            total,
            kept.len(),
            relevant
        );

        Corpus::new(kept)
    }

    fn matches_category(&self, doc: &Document) -> bool {
        doc.categories
            .iter()
            .any(|c| self.categories.iter().any(|wanted| wanted == c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::tests::doc;

    fn categorized(title: &str, summary: &str, categories: &[&str]) -> Document {
        let mut d = doc(title, summary);
        d.categories = categories.iter().map(|c| c.to_string()).collect();
        d
    }

    #[test]
    fn test_default_filter_keeps_listed_categories() {
        let corpus = Corpus::new(vec![
            categorized("Vision", "images", &["cs.CV"]),
            categorized("Algebra", "groups", &["math.GR"]),
            categorized("Signals", "radio", &["math.GR", "eess.SP"]),
            categorized("Broken", "no categories", &[]),
        ]);

        let filtered = CorpusFilter::default().apply(corpus);
        let titles: Vec<&str> = filtered.documents().iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Vision", "Signals"]);
        assert_eq!(filtered.documents()[1].id, 1);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let corpus = Corpus::new(vec![
            categorized("TinyML on microcontrollers", "we compress", &["cs.LG"]),
            categorized("Plain title", "A FEDERATED setup", &["cs.LG"]),
            categorized("Nothing here", "ordinary text", &["cs.LG"]),
        ]);

        let filtered = CorpusFilter::default().apply(corpus);
        let flags: Vec<bool> = filtered.documents().iter().map(|d| d.high_relevance).collect();
        assert_eq!(flags, vec![true, true, false]);
    }

    #[test]
    fn test_apply_drops_labels() {
        let corpus = Corpus::with_labels(vec![categorized("A", "a", &["cs.AI"])], vec![3]).unwrap();
        let filtered = CorpusFilter::new(vec!["cs.AI".into()], vec![]).apply(corpus);
        assert_eq!(filtered.len(), 1);
        assert!(!filtered.is_clustered());
    }
}
