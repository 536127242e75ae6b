//! Layered configuration.
//!
//! Settings are merged from, in increasing priority:
//! - built-in defaults
//! - a TOML file (`ideate.toml` unless another path is given)
//! - environment variables prefixed with `IDEATE_`
//!
//! Binaries apply their CLI flags on top of the loaded [`Settings`].
//!
//! # Environment Variables
//!
//! Double underscores separate nested levels:
//! - `IDEATE_CLUSTERING__MIN_CLUSTER_SIZE=10` sets `clustering.min_cluster_size`
//! - `IDEATE_EMBEDDING__MODEL=BGESmallENV15` sets `embedding.model`
//! - `IDEATE_CACHE_PATH=/tmp/embeddings.bin` sets `cache_path`

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterParams;
use crate::corpus::filter::CorpusFilter;

/// Settings file read when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "ideate.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "IDEATE_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Filtered corpus table, rewritten with a `cluster` column after clustering
    pub corpus_path: PathBuf,

    /// Embedding cache artifact
    pub cache_path: PathBuf,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub clustering: ClusteringSettings,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub ideation: IdeationSettings,

    #[serde(default)]
    pub filter: CorpusFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Model name, e.g. `AllMiniLML6V2` or `sentence-transformers/all-MiniLM-L6-v2`
    pub model: String,

    /// Where model weights are downloaded; fastembed's default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_EMBEDDING_MODEL.to_string(),
            model_cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringSettings {
    pub min_cluster_size: usize,
    pub n_neighbors: usize,
    pub n_components: usize,
    pub min_dist: f64,
    pub seed: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_epochs: Option<usize>,
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        let params = ClusterParams::default();
        Self {
            min_cluster_size: crate::DEFAULT_MIN_CLUSTER_SIZE,
            n_neighbors: params.n_neighbors,
            n_components: params.n_components,
            min_dist: params.min_dist,
            seed: params.seed,
            n_epochs: params.n_epochs,
        }
    }
}

impl ClusteringSettings {
    /// Reduction parameters for the cluster engine.
    pub fn params(&self) -> ClusterParams {
        ClusterParams {
            n_neighbors: self.n_neighbors,
            n_components: self.n_components,
            min_dist: self.min_dist,
            seed: self.seed,
            n_epochs: self.n_epochs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    pub top_k: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            top_k: crate::query::DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeationSettings {
    /// Ideas generated per request
    pub count: usize,

    /// Representative titles kept per cluster
    pub title_sample: usize,

    /// Fixed seed for reproducible ideas; entropy-seeded when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for IdeationSettings {
    fn default() -> Self {
        Self {
            count: 5,
            title_sample: crate::ideation::DEFAULT_TITLE_SAMPLE,
            seed: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("data/filtered_papers.csv"),
            cache_path: PathBuf::from("data/embeddings.bin"),
            embedding: EmbeddingSettings::default(),
            clustering: ClusteringSettings::default(),
            search: SearchSettings::default(),
            ideation: IdeationSettings::default(),
            filter: CorpusFilter::default(),
        }
    }
}

/// Map `CLUSTERING__MIN_CLUSTER_SIZE` to `clustering.min_cluster_size`.
fn nested_key(key: &str) -> String {
    key.to_lowercase().replace("__", ".")
}

impl Settings {
    /// Defaults and the TOML file at `path`, without environment overrides.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
    }

    /// Load settings from defaults, `path` (or [`DEFAULT_CONFIG_FILE`]) and the
    /// environment. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::figment(path)
            .merge(Env::prefixed(ENV_PREFIX).map(|key| nested_key(key.as_str()).into()))
            .extract()
            .map_err(Box::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.corpus_path, PathBuf::from("data/filtered_papers.csv"));
        assert_eq!(settings.embedding.model, "AllMiniLML6V2");
        assert_eq!(settings.clustering.min_cluster_size, 15);
        assert_eq!(settings.clustering.params(), ClusterParams::default());
        assert_eq!(settings.search.top_k, 5);
        assert_eq!(settings.ideation.count, 5);
        assert_eq!(settings.filter.categories.len(), 8);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings: Settings = Settings::figment(dir.path().join("absent.toml"))
            .extract()
            .unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ideate.toml");
        fs::write(
            &path,
            r#"
cache_path = "/tmp/vectors.bin"

[clustering]
min_cluster_size = 8
seed = 7

[ideation]
seed = 99
"#,
        )
        .unwrap();

        let settings: Settings = Settings::figment(&path).extract().unwrap();
        assert_eq!(settings.cache_path, PathBuf::from("/tmp/vectors.bin"));
        assert_eq!(settings.clustering.min_cluster_size, 8);
        assert_eq!(settings.clustering.seed, 7);
        assert_eq!(settings.clustering.n_neighbors, 15);
        assert_eq!(settings.ideation.seed, Some(99));
        assert_eq!(settings.ideation.count, 5);
        assert_eq!(settings.corpus_path, PathBuf::from("data/filtered_papers.csv"));
    }

    #[test]
    fn test_nested_env_key() {
        assert_eq!(nested_key("CLUSTERING__MIN_CLUSTER_SIZE"), "clustering.min_cluster_size");
        assert_eq!(nested_key("CACHE_PATH"), "cache_path");
    }
}
