//! Two-stage clustering of embedding vectors.
//!
//! Vectors are first projected with UMAP under cosine distance, then grouped
//! with HDBSCAN on the projection. The output is one label per input vector,
//! in input order, with [`NOISE_LABEL`] for points outside every dense group.

pub mod hdbscan;
pub mod umap;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::NOISE_LABEL;

/// Errors that can occur while clustering.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A parameter is outside its valid range
    #[error("Invalid clustering parameter: {0}")]
    InvalidParameter(String),

    /// Vectors do not share one dimension
    #[error("Vector {index} has dimension {found}, expected {expected}")]
    InconsistentDimension {
        expected: usize,
        found: usize,
        index: usize,
    },
}

/// Result type for clustering operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Reduction parameters shared by every clustering run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Neighborhood size for the kNN graph (counting the point itself)
    pub n_neighbors: usize,

    /// Dimension of the projection fed to HDBSCAN
    pub n_components: usize,

    /// Minimum spacing of points in the projection
    pub min_dist: f64,

    /// Seed for every random draw of the projection
    pub seed: u64,

    /// Optimization epochs; `None` picks 500 for small inputs and 200 otherwise
    #[serde(default)]
    pub n_epochs: Option<usize>,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            n_components: 5,
            min_dist: 0.0,
            seed: 42,
            n_epochs: None,
        }
    }
}

impl ClusterParams {
    fn umap(&self) -> umap::UmapParams {
        umap::UmapParams {
            n_neighbors: self.n_neighbors,
            n_components: self.n_components,
            min_dist: self.min_dist,
            n_epochs: self.n_epochs,
            seed: self.seed,
            ..umap::UmapParams::default()
        }
    }

    fn validate(&self) -> ClusterResult<()> {
        if self.n_neighbors < 2 {
            return Err(ClusterError::InvalidParameter(format!(
                "n_neighbors must be at least 2, got {}",
                self.n_neighbors
            )));
        }
        if self.n_components == 0 {
            return Err(ClusterError::InvalidParameter(
                "n_components must be positive".to_string(),
            ));
        }
        if !self.min_dist.is_finite() || self.min_dist < 0.0 {
            return Err(ClusterError::InvalidParameter(format!(
                "min_dist must be a non-negative number, got {}",
                self.min_dist
            )));
        }
        Ok(())
    }
}

/// Deterministic cluster engine.
///
/// Identical vectors, parameters and seed always produce identical labels.
#[derive(Debug, Clone, Default)]
pub struct ClusterEngine {
    params: ClusterParams,
}

impl ClusterEngine {
    pub fn new(params: ClusterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    /// Assign a cluster label to every vector.
    ///
    /// # Errors
    /// `InvalidParameter` when `min_cluster_size < 2` or the reduction
    /// parameters are out of range, `InconsistentDimension` when vectors differ
    /// in length.
    pub fn cluster(&self, vectors: &[Vec<f32>], min_cluster_size: usize) -> ClusterResult<Vec<i32>> {
        if min_cluster_size < 2 {
            return Err(ClusterError::InvalidParameter(format!(
                "min_cluster_size must be at least 2, got {}",
                min_cluster_size
            )));
        }
        self.params.validate()?;

        if let Some(first) = vectors.first() {
            let expected = first.len();
            if let Some((index, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != expected) {
                return Err(ClusterError::InconsistentDimension {
                    expected,
                    found: v.len(),
                    index,
                });
            }
        }

        let n = vectors.len();
        if n < min_cluster_size {
            info!(
                "{} vectors cannot form a cluster of {}; all points are noise",
                n, min_cluster_size
            );
            return Ok(vec![NOISE_LABEL; n]);
        }

        let start = Instant::now();
        let reduced = umap::fit_transform(vectors, &self.params.umap());
        info!(
            "Reduced {} vectors to {} dimensions in {:.2?}",
            n,
            self.params.n_components,
            start.elapsed()
        );

        let start = Instant::now();
        let labels = hdbscan::fit_predict(&reduced, min_cluster_size);
        let clusters = labels.iter().copied().max().map_or(0, |m| (m + 1).max(0));
        let noise = labels.iter().filter(|&&l| l == NOISE_LABEL).count();
        info!(
            "Found {} clusters and {} noise points in {:.2?}",
            clusters,
            noise,
            start.elapsed()
        );
        debug!("min_cluster_size={}, params={:?}", min_cluster_size, self.params);

        Ok(labels)
    }
}
