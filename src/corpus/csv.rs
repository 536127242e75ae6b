//! CSV persistence for the corpus table.
//!
//! The on-disk layout has one row per paper with the columns listed in
//! [`REQUIRED_COLUMNS`]; once clustering has run, an integer `cluster` column is
//! added. Unknown extra columns are ignored on read and not written back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ::csv::{ReaderBuilder, StringRecord, Writer};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::{format_category_list, parse_category_list, Corpus, CorpusError, CorpusResult};
use crate::models::Document;

/// Columns a persisted corpus must provide.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "title",
    "summary",
    "authors",
    "published",
    "pdf_url",
    "categories",
    "high_relevance",
];

/// Name of the column carrying cluster labels.
pub const CLUSTER_COLUMN: &str = "cluster";

/// Load a filtered corpus, including its cluster column when present.
pub fn read(path: impl AsRef<Path>) -> CorpusResult<Corpus> {
    read_table(path.as_ref(), &REQUIRED_COLUMNS)
}

/// Load an unfiltered dataset. `high_relevance` may be absent and defaults to false.
pub fn read_raw(path: impl AsRef<Path>) -> CorpusResult<Corpus> {
    read_table(path.as_ref(), &REQUIRED_COLUMNS[..6])
}

fn read_table(path: &Path, required: &[&str]) -> CorpusResult<Corpus> {
    debug!("Reading corpus from {}", path.display());

    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let columns: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim(), idx))
        .collect();

    for column in required {
        if !columns.contains_key(column) {
            return Err(CorpusError::MissingColumn(column.to_string()));
        }
    }

    let field = |record: &StringRecord, column: &str| -> String {
        columns
            .get(column)
            .and_then(|&idx| record.get(idx))
            .unwrap_or_default()
            .to_string()
    };

    let has_cluster = columns.contains_key(CLUSTER_COLUMN);
    let mut documents = Vec::new();
    let mut labels = Vec::new();
    let mut malformed_categories = 0usize;

    for (row, record) in reader.records().enumerate() {
        let record = record?;

        let raw_categories = field(&record, "categories");
        let categories = match parse_category_list(&raw_categories) {
            Ok(categories) => categories,
            Err(e) => {
                debug!("Row {}: malformed categories {:?} ({})", row, raw_categories, e);
                malformed_categories += 1;
                Vec::new()
            }
        };

        let raw_relevance = field(&record, "high_relevance");
        let high_relevance = parse_bool(&raw_relevance).unwrap_or_else(|| {
            warn!(
                "Row {}: unreadable high_relevance value {:?}, treating as false",
                row, raw_relevance
            );
            false
        });

        documents.push(Document {
            id: row,
            title: field(&record, "title"),
            summary: field(&record, "summary"),
            authors: field(&record, "authors"),
            published: field(&record, "published"),
            categories,
            high_relevance,
            pdf_url: field(&record, "pdf_url"),
        });

        if has_cluster {
            let raw_label = field(&record, CLUSTER_COLUMN);
            let label = parse_label(&raw_label).ok_or_else(|| CorpusError::InvalidValue {
                row,
                column: CLUSTER_COLUMN.to_string(),
                value: raw_label.clone(),
            })?;
            labels.push(label);
        }
    }

    if malformed_categories > 0 {
        warn!(
            "{} rows had malformed category fields and were given an empty category set",
            malformed_categories
        );
    }

    info!(
        "Loaded {} papers from {} (clustered: {})",
        documents.len(),
        path.display(),
        has_cluster
    );

    if has_cluster {
        Corpus::with_labels(documents, labels)
    } else {
        Ok(Corpus::new(documents))
    }
}

/// Persist the corpus, replacing `path` atomically.
///
/// The cluster column is written only when the corpus carries labels.
pub fn write(corpus: &Corpus, path: impl AsRef<Path>) -> CorpusResult<()> {
    let path = path.as_ref();
    let dir = parent_dir(path);
    std::fs::create_dir_all(&dir)?;

    let mut writer = Writer::from_writer(NamedTempFile::new_in(&dir)?);

    let mut header: Vec<&str> = REQUIRED_COLUMNS.to_vec();
    if corpus.is_clustered() {
        header.push(CLUSTER_COLUMN);
    }
    writer.write_record(&header)?;

    for (row, doc) in corpus.documents().iter().enumerate() {
        let mut record = vec![
            doc.title.clone(),
            doc.summary.clone(),
            doc.authors.clone(),
            doc.published.clone(),
            doc.pdf_url.clone(),
            format_category_list(&doc.categories),
            if doc.high_relevance { "True" } else { "False" }.to_string(),
        ];
        if let Some(labels) = corpus.labels() {
            record.push(labels[row].to_string());
        }
        writer.write_record(&record)?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| CorpusError::IoError(e.into_error()))?;
    file.persist(path).map_err(|e| CorpusError::IoError(e.error))?;

    info!("Saved {} papers to {}", corpus.len(), path.display());
    Ok(())
}

/// Directory that will hold `path`, `.` for bare file names.
pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "True" | "true" | "TRUE" | "1" => Some(true),
        "False" | "false" | "FALSE" | "0" | "" => Some(false),
        _ => None,
    }
}

fn parse_label(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    raw.parse::<i32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && *v >= i32::MIN as f64 && *v <= i32::MAX as f64)
            .map(|v| v as i32)
    })
}
