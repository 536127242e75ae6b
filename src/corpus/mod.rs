//! Corpus table module.
//!
//! The corpus is the already-filtered table of papers the rest of the system
//! consumes. Row order is the stable positional index shared by the embedding
//! vectors and the cluster labels; the optional `cluster` column is the only
//! place cluster state lives between runs.
//!
//! Submodules:
//! - [`csv`]: reading and atomically writing the tabular corpus
//! - [`filter`]: category/keyword filtering of a raw dataset

pub mod csv;
pub mod filter;

use thiserror::Error;

use crate::models::Document;

/// Errors that can occur while loading, validating or persisting the corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Failed to read or write the corpus file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The tabular data could not be parsed
    #[error("CSV error: {0}")]
    CsvError(#[from] ::csv::Error),

    /// A column the pipeline depends on is absent
    #[error("Missing required corpus column '{0}'")]
    MissingColumn(String),

    /// A structural value could not be interpreted
    #[error("Invalid value {value:?} in column '{column}' at row {row}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    /// Labels and documents are not positionally parallel
    #[error("Cluster labels ({labels}) do not match document count ({documents})")]
    LengthMismatch { documents: usize, labels: usize },
}

/// Result type for corpus operations.
pub type CorpusResult<T> = Result<T, CorpusError>;

/// Reasons a stored category field could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryParseError {
    #[error("value is not a bracketed list")]
    NotAList,

    #[error("unterminated quoted entry")]
    Unterminated,

    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
}

/// Parse a serialized category list such as `['cs.AI', 'cs.LG']`.
///
/// Only a bracketed list of single- or double-quoted strings is accepted; a
/// trailing comma is allowed. Anything else is reported as an error so the
/// caller can decide to fall back to an empty set.
pub fn parse_category_list(raw: &str) -> Result<Vec<String>, CategoryParseError> {
    let inner = raw
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or(CategoryParseError::NotAList)?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let quote = match chars.next() {
            None => break,
            Some(q @ ('\'' | '"')) => q,
            Some(c) => return Err(CategoryParseError::UnexpectedChar(c)),
        };

        let mut item = String::new();
        loop {
            match chars.next() {
                None => return Err(CategoryParseError::Unterminated),
                Some('\\') => match chars.next() {
                    Some(escaped) => item.push(escaped),
                    None => return Err(CategoryParseError::Unterminated),
                },
                Some(c) if c == quote => break,
                Some(c) => item.push(c),
            }
        }
        items.push(item);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(c) => return Err(CategoryParseError::UnexpectedChar(c)),
        }
    }

    Ok(items)
}

/// Serialize categories back into the list literal accepted by [`parse_category_list`].
pub fn format_category_list(categories: &[String]) -> String {
    let quoted: Vec<String> = categories
        .iter()
        .map(|c| format!("'{}'", c.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect();
    format!("[{}]", quoted.join(", "))
}

/// In-memory corpus: documents in table order plus the optional cluster column.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<Document>,
    labels: Option<Vec<i32>>,
}

impl Corpus {
    /// Build an unclustered corpus. Document ids are reassigned to row positions.
    pub fn new(mut documents: Vec<Document>) -> Self {
        for (row, doc) in documents.iter_mut().enumerate() {
            doc.id = row;
        }
        Self {
            documents,
            labels: None,
        }
    }

    /// Build a corpus that already carries a cluster column.
    pub fn with_labels(documents: Vec<Document>, labels: Vec<i32>) -> CorpusResult<Self> {
        let mut corpus = Self::new(documents);
        corpus.set_labels(labels)?;
        Ok(corpus)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Cluster labels, or `None` when clustering has not run on this corpus.
    pub fn labels(&self) -> Option<&[i32]> {
        self.labels.as_deref()
    }

    pub fn is_clustered(&self) -> bool {
        self.labels.is_some()
    }

    /// Attach a cluster column; it must have exactly one label per document.
    pub fn set_labels(&mut self, labels: Vec<i32>) -> CorpusResult<()> {
        if labels.len() != self.documents.len() {
            return Err(CorpusError::LengthMismatch {
                documents: self.documents.len(),
                labels: labels.len(),
            });
        }
        self.labels = Some(labels);
        Ok(())
    }

    pub fn clear_labels(&mut self) {
        self.labels = None;
    }

    /// Embedding input text for every document, in table order.
    pub fn texts(&self) -> Vec<String> {
        self.documents.iter().map(Document::embedding_text).collect()
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}
