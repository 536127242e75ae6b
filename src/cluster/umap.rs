//! Seeded UMAP projection under cosine distance.
//!
//! Steps: exact k-nearest neighbors, smooth kNN distances into a fuzzy
//! simplicial set, symmetrize with a fuzzy union, then lay the graph out in
//! the target dimension with negative-sampling SGD. Every random draw comes
//! from one `StdRng` seeded by the caller, so a given input always produces the
//! same projection.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SMOOTH_K_TOLERANCE: f64 = 1e-5;
const MIN_K_DIST_SCALE: f64 = 1e-3;
const NEGATIVE_SAMPLE_RATE: f64 = 5.0;
const INIT_RANGE: f64 = 10.0;
const GRAD_CLIP: f64 = 4.0;

/// Parameters for one projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UmapParams {
    pub n_neighbors: usize,
    pub n_components: usize,
    pub min_dist: f64,
    pub spread: f64,
    pub n_epochs: Option<usize>,
    pub seed: u64,
}

impl Default for UmapParams {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            n_components: 5,
            min_dist: 0.0,
            spread: 1.0,
            n_epochs: None,
            seed: 42,
        }
    }
}

/// Cosine distance `1 - cos(a, b)`; zero vectors are at distance 1 from everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())).max(0.0)
}

/// Project `data` to `params.n_components` dimensions.
///
/// Callers guarantee at least two points; smaller inputs have nothing to
/// embed relative to.
pub fn fit_transform(data: &[Vec<f32>], params: &UmapParams) -> Vec<Vec<f64>> {
    let n = data.len();
    let dim = params.n_components.max(1);
    let mut rng = StdRng::seed_from_u64(params.seed);

    let k = params.n_neighbors.saturating_sub(1).clamp(1, n.saturating_sub(1).max(1));
    let (knn_indices, knn_dists) = nearest_neighbors(data, k);
    let (sigmas, rhos) = smooth_knn_dist(&knn_dists, (k + 1) as f64);
    let edges = fuzzy_union(&knn_indices, &knn_dists, &sigmas, &rhos);

    let n_epochs = params
        .n_epochs
        .unwrap_or(if n <= 10_000 { 500 } else { 200 });
    let (a, b) = find_ab_params(params.spread, params.min_dist);

    let mut embedding: Vec<f64> = (0..n * dim)
        .map(|_| rng.gen_range(-INIT_RANGE..INIT_RANGE))
        .collect();

    optimize_layout(&mut embedding, dim, &edges, n_epochs, a, b, &mut rng);

    embedding.chunks(dim).map(|c| c.to_vec()).collect()
}

/// Exact kNN by brute force; each row excludes the point itself and is
/// ordered by distance, ties broken by index.
fn nearest_neighbors(data: &[Vec<f32>], k: usize) -> (Vec<Vec<usize>>, Vec<Vec<f64>>) {
    let n = data.len();
    let mut indices = Vec::with_capacity(n);
    let mut dists = Vec::with_capacity(n);

    for i in 0..n {
        let mut row: Vec<(usize, f64)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| (j, cosine_distance(&data[i], &data[j])))
            .collect();
        keep_nearest(&mut row, k);
        indices.push(row.iter().map(|&(j, _)| j).collect());
        dists.push(row.iter().map(|&(_, d)| d).collect());
    }

    (indices, dists)
}

/// Keep the `k` closest entries of `row`, sorted by distance then index.
fn keep_nearest(row: &mut Vec<(usize, f64)>, k: usize) {
    let by_distance = |x: &(usize, f64), y: &(usize, f64)| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0));
    if k == 0 {
        row.clear();
        return;
    }
    if k < row.len() {
        row.select_nth_unstable_by(k - 1, by_distance);
        row.truncate(k);
    }
    row.sort_by(by_distance);
}

/// Per-point bandwidth `sigma` and local connectivity offset `rho`.
fn smooth_knn_dist(dists: &[Vec<f64>], k: f64) -> (Vec<f64>, Vec<f64>) {
    let target = k.log2();
    let mean_all = {
        let (sum, count) = dists
            .iter()
            .flatten()
            .fold((0.0, 0usize), |(s, c), &d| (s + d, c + 1));
        if count > 0 {
            sum / count as f64
        } else {
            0.0
        }
    };

    let mut sigmas = Vec::with_capacity(dists.len());
    let mut rhos = Vec::with_capacity(dists.len());

    for row in dists {
        let rho = row.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);

        let mut lo = 0.0;
        let mut hi = f64::INFINITY;
        let mut mid = 1.0;
        for _ in 0..64 {
            let psum: f64 = row
                .iter()
                .map(|&d| {
                    let gap = d - rho;
                    if gap > 0.0 {
                        (-gap / mid).exp()
                    } else {
                        1.0
                    }
                })
                .sum();

            if (psum - target).abs() < SMOOTH_K_TOLERANCE {
                break;
            }
            if psum > target {
                hi = mid;
                mid = (lo + hi) / 2.0;
            } else {
                lo = mid;
                mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
            }
        }

        let mean_row = if row.is_empty() {
            0.0
        } else {
            row.iter().sum::<f64>() / row.len() as f64
        };
        let scale = if rho > 0.0 { mean_row } else { mean_all };
        let floor = scale * MIN_K_DIST_SCALE;

        sigmas.push(mid.max(floor));
        rhos.push(rho);
    }

    (sigmas, rhos)
}

/// Directed membership strengths combined as `w_ij + w_ji - w_ij * w_ji`.
///
/// Returns both directions of every undirected edge, sorted by (head, tail).
fn fuzzy_union(
    indices: &[Vec<usize>],
    dists: &[Vec<f64>],
    sigmas: &[f64],
    rhos: &[f64],
) -> Vec<(usize, usize, f64)> {
    use std::collections::BTreeMap;

    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (i, (row_idx, row_dist)) in indices.iter().zip(dists).enumerate() {
        for (&j, &d) in row_idx.iter().zip(row_dist) {
            let gap = d - rhos[i];
            let w = if gap <= 0.0 || sigmas[i] == 0.0 {
                1.0
            } else {
                (-gap / sigmas[i]).exp()
            };
            directed.insert((i, j), w);
        }
    }

    let mut edges = Vec::new();
    let mut seen: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (&(i, j), &w_ij) in &directed {
        let key = (i.min(j), i.max(j));
        if seen.contains_key(&key) {
            continue;
        }
        let w_ji = directed.get(&(j, i)).copied().unwrap_or(0.0);
        seen.insert(key, w_ij + w_ji - w_ij * w_ji);
    }
    for (&(i, j), &w) in &seen {
        if w > 0.0 {
            edges.push((i, j, w));
            edges.push((j, i, w));
        }
    }
    edges.sort_by(|x, y| x.0.cmp(&y.0).then(x.1.cmp(&y.1)));
    edges
}

/// Fit `1 / (1 + a * x^(2b))` to the target membership curve by grid refinement.
pub(crate) fn find_ab_params(spread: f64, min_dist: f64) -> (f64, f64) {
    let xs: Vec<f64> = (0..300).map(|i| 3.0 * spread * i as f64 / 299.0).collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();

    let loss = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| {
                let pred = 1.0 / (1.0 + a * x.powf(2.0 * b));
                (pred - y).powi(2)
            })
            .sum()
    };

    let (mut best_a, mut best_b) = (1.0, 1.0);
    let mut best = loss(best_a, best_b);
    let (mut a_lo, mut a_hi, mut b_lo, mut b_hi) = (0.01, 10.0, 0.1, 3.0);

    for _ in 0..4 {
        let steps = 60;
        for ia in 0..=steps {
            let a = a_lo + (a_hi - a_lo) * ia as f64 / steps as f64;
            for ib in 0..=steps {
                let b = b_lo + (b_hi - b_lo) * ib as f64 / steps as f64;
                let l = loss(a, b);
                if l < best {
                    best = l;
                    best_a = a;
                    best_b = b;
                }
            }
        }
        let a_span = (a_hi - a_lo) / 10.0;
        let b_span = (b_hi - b_lo) / 10.0;
        a_lo = (best_a - a_span).max(1e-4);
        a_hi = best_a + a_span;
        b_lo = (best_b - b_span).max(1e-2);
        b_hi = best_b + b_span;
    }

    (best_a, best_b)
}

fn clip(v: f64) -> f64 {
    v.clamp(-GRAD_CLIP, GRAD_CLIP)
}

fn sq_dist(embedding: &[f64], dim: usize, i: usize, j: usize) -> f64 {
    (0..dim)
        .map(|d| {
            let diff = embedding[i * dim + d] - embedding[j * dim + d];
            diff * diff
        })
        .sum()
}

fn optimize_layout(
    embedding: &mut [f64],
    dim: usize,
    edges: &[(usize, usize, f64)],
    n_epochs: usize,
    a: f64,
    b: f64,
    rng: &mut StdRng,
) {
    let n = embedding.len() / dim;
    let max_weight = edges.iter().map(|e| e.2).fold(0.0, f64::max);
    if max_weight <= 0.0 || n_epochs == 0 {
        return;
    }

    // Edges too weak to be sampled even once are dropped.
    let active: Vec<(usize, usize, f64)> = edges
        .iter()
        .copied()
        .filter(|e| e.2 >= max_weight / n_epochs as f64)
        .map(|(i, j, w)| (i, j, max_weight / w))
        .collect();

    let mut next_sample: Vec<f64> = active.iter().map(|e| e.2).collect();
    let per_negative: Vec<f64> = active.iter().map(|e| e.2 / NEGATIVE_SAMPLE_RATE).collect();
    let mut next_negative = per_negative.clone();

    for epoch in 0..n_epochs {
        let alpha = 1.0 - epoch as f64 / n_epochs as f64;
        let epoch_f = epoch as f64;

        for (e, &(head, tail, every)) in active.iter().enumerate() {
            if next_sample[e] > epoch_f {
                continue;
            }

            let dist_sq = sq_dist(embedding, dim, head, tail);
            let coeff = if dist_sq > 0.0 {
                -2.0 * a * b * dist_sq.powf(b - 1.0) / (a * dist_sq.powf(b) + 1.0)
            } else {
                0.0
            };
            for d in 0..dim {
                let diff = embedding[head * dim + d] - embedding[tail * dim + d];
                let grad = clip(coeff * diff);
                embedding[head * dim + d] += grad * alpha;
                embedding[tail * dim + d] -= grad * alpha;
            }
            next_sample[e] += every;

            let n_negative = ((epoch_f - next_negative[e]) / per_negative[e]).floor().max(0.0) as usize;
            for _ in 0..n_negative {
                let other = rng.gen_range(0..n);
                if other == head {
                    continue;
                }
                let dist_sq = sq_dist(embedding, dim, head, other);
                let coeff = if dist_sq > 0.0 {
                    2.0 * b / ((0.001 + dist_sq) * (a * dist_sq.powf(b) + 1.0))
                } else {
                    0.0
                };
                for d in 0..dim {
                    let grad = if coeff > 0.0 {
                        clip(coeff * (embedding[head * dim + d] - embedding[other * dim + d]))
                    } else {
                        GRAD_CLIP
                    };
                    embedding[head * dim + d] += grad * alpha;
                }
            }
            next_negative[e] += n_negative as f64 * per_negative[e];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn euclid(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
    }

    #[test]
    fn test_keep_nearest_matches_full_sort() {
        let distances = [0.7, 0.2, 0.9, 0.2, 0.05, 0.4, 0.2, 0.6];
        let row: Vec<(usize, f64)> = distances.iter().copied().enumerate().collect();

        let mut full = row.clone();
        full.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));

        for k in 0..=row.len() + 2 {
            let mut kept = row.clone();
            keep_nearest(&mut kept, k);
            assert_eq!(kept, full[..k.min(full.len())].to_vec());
        }

        let mut kept = row.clone();
        keep_nearest(&mut kept, 3);
        assert_eq!(kept.iter().map(|&(j, _)| j).collect::<Vec<_>>(), vec![4, 1, 3]);
    }

    fn two_groups() -> Vec<Vec<f32>> {
        let mut data = Vec::new();
        for g in 0..2 {
            for i in 0..10 {
                let mut v = vec![0.0f32; 12];
                v[g] = 1.0;
                v[2 + (i % 10)] = 0.05 + 0.01 * i as f32;
                data.push(v);
            }
        }
        data
    }

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-12);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 3.0]) - 1.0).abs() < 1e-12);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-12);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_ab_params_for_zero_min_dist() {
        let (a, b) = find_ab_params(1.0, 0.0);
        assert!((a - 1.93).abs() < 0.1, "a = {}", a);
        assert!((b - 0.79).abs() < 0.05, "b = {}", b);
    }

    #[test]
    fn test_ab_params_for_default_min_dist() {
        let (a, b) = find_ab_params(1.0, 0.1);
        assert!((a - 1.58).abs() < 0.1, "a = {}", a);
        assert!((b - 0.90).abs() < 0.05, "b = {}", b);
    }

    #[test]
    fn test_projection_shape_and_determinism() {
        let data = two_groups();
        let params = UmapParams::default();
        let first = fit_transform(&data, &params);
        let second = fit_transform(&data, &params);

        assert_eq!(first.len(), 20);
        assert!(first.iter().all(|p| p.len() == 5));
        assert!(first.iter().flatten().all(|x| x.is_finite()));
        assert_eq!(first, second);
    }

    #[test]
    fn test_projection_keeps_groups_apart() {
        let reduced = fit_transform(&two_groups(), &UmapParams::default());

        let centroid = |range: std::ops::Range<usize>| -> Vec<f64> {
            let count = range.len() as f64;
            let mut c = vec![0.0; 5];
            for i in range {
                for (d, x) in reduced[i].iter().enumerate() {
                    c[d] += x / count;
                }
            }
            c
        };
        let centroids = [centroid(0..10), centroid(10..20)];

        for (i, point) in reduced.iter().enumerate() {
            let own = i / 10;
            let other = 1 - own;
            assert!(
                euclid(point, &centroids[own]) < euclid(point, &centroids[other]),
                "point {} drifted toward the other group",
                i
            );
        }
    }

    #[test]
    fn test_fuzzy_union_is_symmetric() {
        let (idx, dist) = nearest_neighbors(&two_groups(), 4);
        let (sigmas, rhos) = smooth_knn_dist(&dist, 5.0);
        let edges = fuzzy_union(&idx, &dist, &sigmas, &rhos);
        for &(i, j, w) in &edges {
            assert!(w > 0.0 && w <= 1.0);
            assert!(edges.iter().any(|&(x, y, v)| x == j && y == i && v == w));
        }
    }
}
