//! HDBSCAN with excess-of-mass cluster selection.
//!
//! The flat clustering is extracted from the density hierarchy: mutual
//! reachability distances, their minimum spanning tree, the single-linkage
//! dendrogram built from it, and the condensed tree that only keeps splits
//! where both sides have at least `min_cluster_size` points. The root is never
//! selected, so a dataset with no internal split is all noise.

use std::collections::VecDeque;

use crate::models::NOISE_LABEL;

/// Distances below this are treated as this value when converting to lambda.
const MIN_DISTANCE: f64 = 1e-12;

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Distance to the `min_samples`-th nearest other point, clamped to the
/// farthest one when fewer exist. Each row still holds the zero self-distance
/// at position 0.
fn core_distances(data: &[Vec<f64>], min_samples: usize) -> Vec<f64> {
    data.iter()
        .map(|p| {
            let mut dists: Vec<f64> = data.iter().map(|q| euclidean(p, q)).collect();
            let kth = min_samples.min(dists.len() - 1);
            let (_, value, _) = dists.select_nth_unstable_by(kth, |a, b| a.total_cmp(b));
            *value
        })
        .collect()
}

/// Prim's algorithm over the dense mutual reachability graph.
/// Returns `n - 1` edges sorted by weight.
fn mutual_reachability_mst(data: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = data.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let d = euclidean(&data[current], &data[j])
                .max(core[current])
                .max(core[j]);
            if d < best[j] {
                best[j] = d;
                from[j] = current;
            }
        }

        let mut next = usize::MAX;
        for j in 0..n {
            if !in_tree[j] && (next == usize::MAX || best[j] < best[next]) {
                next = j;
            }
        }

        edges.push((from[next], next, best[next]));
        in_tree[next] = true;
        current = next;
    }

    edges.sort_by(|a, b| a.2.total_cmp(&b.2));
    edges
}

/// Internal node of the single-linkage dendrogram.
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

/// Single-linkage dendrogram: leaves are `0..n`, merge `k` is node `n + k`.
fn single_linkage(n: usize, mst: &[(usize, usize, f64)]) -> Vec<Merge> {
    let mut parent: Vec<usize> = (0..2 * n).collect();
    let mut size = vec![1usize; 2 * n];

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let mut merges = Vec::with_capacity(mst.len());
    for (k, &(a, b, distance)) in mst.iter().enumerate() {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        let node = n + k;
        size[node] = size[ra] + size[rb];
        parent[ra] = node;
        parent[rb] = node;
        merges.push(Merge {
            left: ra,
            right: rb,
            distance,
            size: size[node],
        });
    }
    merges
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Child {
    Point(usize),
    Cluster(usize),
}

/// One row of the condensed tree.
#[derive(Debug, Clone, Copy)]
struct Condensed {
    parent: usize,
    child: Child,
    lambda: f64,
    size: usize,
}

fn condense_tree(n: usize, merges: &[Merge], min_cluster_size: usize) -> (Vec<Condensed>, usize) {
    let node_size = |node: usize| if node < n { 1 } else { merges[node - n].size };

    let leaves_of = |node: usize| -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(x) = stack.pop() {
            if x < n {
                out.push(x);
            } else {
                stack.push(merges[x - n].right);
                stack.push(merges[x - n].left);
            }
        }
        out
    };

    let root = n + merges.len() - 1;
    let mut relabel = vec![0usize; n + merges.len()];
    let mut next_label = 1;
    let mut tree = Vec::new();
    let mut queue = VecDeque::from([root]);

    while let Some(node) = queue.pop_front() {
        if node < n {
            continue;
        }
        let merge = merges[node - n];
        let lambda = 1.0 / merge.distance.max(MIN_DISTANCE);
        let cluster = relabel[node];
        let left_big = node_size(merge.left) >= min_cluster_size;
        let right_big = node_size(merge.right) >= min_cluster_size;

        for (child, big, other_big) in [
            (merge.left, left_big, right_big),
            (merge.right, right_big, left_big),
        ] {
            match (big, other_big) {
                (true, true) => {
                    relabel[child] = next_label;
                    tree.push(Condensed {
                        parent: cluster,
                        child: Child::Cluster(next_label),
                        lambda,
                        size: node_size(child),
                    });
                    next_label += 1;
                    queue.push_back(child);
                }
                (true, false) => {
                    relabel[child] = cluster;
                    queue.push_back(child);
                }
                (false, _) => {
                    for leaf in leaves_of(child) {
                        tree.push(Condensed {
                            parent: cluster,
                            child: Child::Point(leaf),
                            lambda,
                            size: 1,
                        });
                    }
                }
            }
        }
    }

    (tree, next_label)
}

/// Excess-of-mass selection over the condensed tree; the root is never selected.
fn select_clusters(tree: &[Condensed], num_clusters: usize) -> Vec<bool> {
    let mut birth = vec![0.0f64; num_clusters];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); num_clusters];
    for row in tree {
        if let Child::Cluster(c) = row.child {
            birth[c] = row.lambda;
            children[row.parent].push(c);
        }
    }

    let mut stability = vec![0.0f64; num_clusters];
    for row in tree {
        stability[row.parent] += (row.lambda - birth[row.parent]) * row.size as f64;
    }

    let mut selected = vec![false; num_clusters];
    for c in (1..num_clusters).rev() {
        let subtree: f64 = children[c].iter().map(|&ch| stability[ch]).sum();
        if subtree > stability[c] {
            stability[c] = subtree;
        } else {
            selected[c] = true;
            let mut stack = children[c].clone();
            while let Some(d) = stack.pop() {
                selected[d] = false;
                stack.extend(children[d].iter().copied());
            }
        }
    }
    selected
}

/// Cluster `data`, returning one label per point with `-1` for noise.
///
/// `min_samples` equals `min_cluster_size`. Inputs smaller than
/// `min_cluster_size` cannot form a cluster and come back as all noise.
pub fn fit_predict(data: &[Vec<f64>], min_cluster_size: usize) -> Vec<i32> {
    let n = data.len();
    if n < 2 || n < min_cluster_size {
        return vec![NOISE_LABEL; n];
    }

    let core = core_distances(data, min_cluster_size.min(n));
    let mst = mutual_reachability_mst(data, &core);
    let merges = single_linkage(n, &mst);
    let (tree, num_clusters) = condense_tree(n, &merges, min_cluster_size);
    let selected = select_clusters(&tree, num_clusters);

    let mut cluster_parent = vec![0usize; num_clusters];
    for row in &tree {
        if let Child::Cluster(c) = row.child {
            cluster_parent[c] = row.parent;
        }
    }

    let mut output_label = vec![NOISE_LABEL; num_clusters];
    let mut next = 0;
    for (c, &is_selected) in selected.iter().enumerate() {
        if is_selected {
            output_label[c] = next;
            next += 1;
        }
    }

    let mut labels = vec![NOISE_LABEL; n];
    for row in &tree {
        if let Child::Point(p) = row.child {
            let mut c = row.parent;
            while c != 0 && !selected[c] {
                c = cluster_parent[c];
            }
            if selected[c] {
                labels[p] = output_label[c];
            }
        }
    }
    labels
}
