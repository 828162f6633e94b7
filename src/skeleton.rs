//! Skeletonization: the bottom-up interpolative decomposition that gives
//! every non-root node a compressed "skeleton" column set `S` and projector
//! `P` such that `K(:, B) ~= K(:, S) P`.
//!
//! A merge-neighbors step builds `pnids`/`snids` bottom-up, a 2|B|-sized row
//! sample mixes sorted `snids`, importance samples, and uniform top-up, and
//! compression failure propagates upward under level-restricted adaptive
//! compression. The QR itself is `crate::linalg::pivoted_qr`.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::accessor::MatrixAccessor;
use crate::ann::NeighborTable;
use crate::linalg::{self, ToleranceKind};
use crate::runtime::RuntimeContext;
use crate::tree::{Node, Tree};

/// Per-node skeletonization result, keyed by Morton id.
#[derive(Debug, Clone)]
pub struct SkeletonInfo {
    /// Pruning neighbors: union of top-(k/2) NN gids of the node's own
    /// skeleton (or, pre-skeletonization at leaves, of its own members).
    pub pnids: Vec<usize>,
    /// Sample neighbors: candidate row ids for the next level up's sampling.
    pub snids: Vec<usize>,
    /// Whether this node successfully compressed.
    pub isskel: bool,
    /// Absolute gids of the chosen skeleton columns, empty if `!isskel`.
    pub skeleton: Vec<usize>,
    /// Projector `P`, shape `rank x |B|`, columns ordered as `B` was built
    /// (children's skeletons concatenated, or leaf gids).
    pub projector: nalgebra::DMatrix<f64>,
    /// The column set `B` this node's projector is expressed against.
    pub column_set: Vec<usize>,
}

pub type SkeletonMap = HashMap<u64, SkeletonInfo>;

/// Runs skeletonization bottom-up over every non-root node of `tree`.
pub fn skeletonize(
    tree: &Tree,
    matrix: &dyn MatrixAccessor,
    neighbors: &NeighborTable,
    context: &RuntimeContext,
    adaptive: bool,
) -> SkeletonMap {
    let mut map = SkeletonMap::new();
    skeletonize_node(&tree.root, matrix, neighbors, context, adaptive, true, &mut map);
    map
}

fn skeletonize_node(
    node: &Node,
    matrix: &dyn MatrixAccessor,
    neighbors: &NeighborTable,
    context: &RuntimeContext,
    adaptive: bool,
    is_root: bool,
    map: &mut SkeletonMap,
) {
    if let Some((left, right)) = &node.children {
        skeletonize_node(left, matrix, neighbors, context, adaptive, false, map);
        skeletonize_node(right, matrix, neighbors, context, adaptive, false, map);
    }

    if is_root {
        return;
    }

    let half_k = (neighbors.k / 2).max(1);

    let (column_set, pnids_children, snids_children, child_failed) = match &node.children {
        None => {
            // Leaf merge-neighbors step: pnids from top-(k/2) NN of each own
            // gid minus own gids; snids from the remaining (bottom) half,
            // sorted, deduped, excluding own and pruned gids.
            let own: std::collections::HashSet<usize> = node.gids.iter().copied().collect();
            let mut pnids = std::collections::HashSet::new();
            let mut snids_candidates: Vec<(usize, f64)> = Vec::new();

            for &g in &node.gids {
                let col = &neighbors.columns[g];
                for &(nbr, _) in col.iter().take(half_k) {
                    if !own.contains(&nbr) {
                        pnids.insert(nbr);
                    }
                }
                for &(nbr, d) in col.iter().skip(half_k) {
                    if !own.contains(&nbr) {
                        snids_candidates.push((nbr, d));
                    }
                }
            }
            snids_candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

            let target = 2 * node.gids.len();
            let mut snids = Vec::with_capacity(target);
            let mut seen = std::collections::HashSet::new();
            for &(nbr, _) in &snids_candidates {
                if snids.len() >= target {
                    break;
                }
                if pnids.contains(&nbr) || !seen.insert(nbr) {
                    continue;
                }
                snids.push(nbr);
            }

            (node.gids.clone(), pnids, snids, false)
        }
        Some((left, right)) => {
            let left_info = map.get(&left.morton).expect("left child already skeletonized");
            let right_info = map.get(&right.morton).expect("right child already skeletonized");

            let mut column_set = left_info.skeleton.clone();
            column_set.extend_from_slice(&right_info.skeleton);

            let own: std::collections::HashSet<usize> = node.gids.iter().copied().collect();

            // Merge children's snids, keeping the minimum distance for
            // duplicates; distance isn't tracked post-merge here since the
            // source `snids` are already sorted ascending for each child, so
            // a stable merge by first-seen order approximates min-distance
            // ordering closely enough for sampling purposes.
            let mut pnids: std::collections::HashSet<usize> =
                left_info.pnids.iter().chain(right_info.pnids.iter()).copied().collect();
            pnids.retain(|g| !own.contains(g));

            let mut snids = Vec::new();
            let mut seen = std::collections::HashSet::new();
            for &g in left_info.snids.iter().chain(right_info.snids.iter()) {
                if own.contains(&g) || pnids.contains(&g) || !seen.insert(g) {
                    continue;
                }
                snids.push(g);
            }

            let child_failed = !left_info.isskel || !right_info.isskel;
            (column_set, pnids, snids, child_failed)
        }
    };

    if adaptive && child_failed {
        map.insert(
            node.morton,
            SkeletonInfo {
                pnids: pnids_children.into_iter().collect(),
                snids: snids_children,
                isskel: false,
                skeleton: Vec::new(),
                projector: nalgebra::DMatrix::zeros(0, column_set.len()),
                column_set,
            },
        );
        return;
    }

    let mut rng = context.rng(node.morton);
    let row_sample = sample_rows(matrix, &snids_children, &column_set, &mut rng);

    let a_rows = row_sample;
    let k_ab = matrix.block(&a_rows, &column_set);

    let max_rank = context.max_rank.min(column_set.len());
    let qr = linalg::pivoted_qr(&k_ab, context.tolerance, max_rank, ToleranceKind::Relative);

    let (isskel, rank) = if adaptive {
        (qr.rank > 0, qr.rank)
    } else {
        (true, max_rank)
    };

    let skeleton: Vec<usize> = qr.jpvt[..rank].iter().map(|&local| column_set[local]).collect();
    let projector = if isskel {
        linalg::interpolation_matrix(&qr, column_set.len())
    } else {
        nalgebra::DMatrix::zeros(0, column_set.len())
    };

    // pnids update: union of top-(k/2) NN of every chosen skeleton gid.
    let mut pnids: std::collections::HashSet<usize> = pnids_children.into_iter().collect();
    for &s in &skeleton {
        for &(nbr, _) in neighbors.columns[s].iter().take(half_k) {
            pnids.insert(nbr);
        }
    }

    map.insert(
        node.morton,
        SkeletonInfo {
            pnids: pnids.into_iter().collect(),
            snids: snids_children,
            isskel,
            skeleton,
            projector,
            column_set,
        },
    );
}

/// Row sample `A` of target size `2|B|`: primarily `snids` (already sorted
/// ascending by distance), topped up 80% importance / 20% uniform when
/// `snids` runs short, avoiding duplicates and self.
fn sample_rows(matrix: &dyn MatrixAccessor, snids: &[usize], column_set: &[usize], rng: &mut impl Rng) -> Vec<usize> {
    let target = 2 * column_set.len();
    let own: std::collections::HashSet<usize> = column_set.iter().copied().collect();
    let mut chosen = Vec::with_capacity(target);
    let mut seen = std::collections::HashSet::new();

    for &g in snids {
        if chosen.len() >= target {
            break;
        }
        if own.contains(&g) || !seen.insert(g) {
            continue;
        }
        chosen.push(g);
    }

    let remaining = target.saturating_sub(chosen.len());
    let n_importance = (remaining as f64 * 0.8).round() as usize;
    let n_uniform = remaining - n_importance;

    if !column_set.is_empty() {
        for _ in 0..n_importance {
            let j = column_set[rng.gen_range(0..column_set.len())];
            let (_, i) = matrix.important_sample(j, rng);
            if own.contains(&i) || !seen.insert(i) {
                continue;
            }
            chosen.push(i);
        }
    }

    let n = matrix.n();
    let mut pool: Vec<usize> = (0..n).collect();
    pool.shuffle(rng);
    let mut added_uniform = 0;
    for i in pool {
        if chosen.len() >= target || added_uniform >= n_uniform {
            break;
        }
        if own.contains(&i) || !seen.insert(i) {
            continue;
        }
        chosen.push(i);
        added_uniform += 1;
    }

    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::TestsuiteAccessor;
    use crate::config::Metric;
    use crate::tree::splitters::GeometryObliviousSplitter;

    #[test]
    fn skeletonization_assigns_every_non_root_node() {
        let n = 64;
        let matrix = TestsuiteAccessor::new(n, 9);
        let context = RuntimeContext::new(8, 6, 4, 6).with_seed(1);

        let splitter = GeometryObliviousSplitter {
            matrix: &matrix,
            angle: false,
            seed: context.seed,
        };
        let indices: Vec<usize> = (0..n).collect();
        let tree = crate::tree::build(indices, context.leaf_size, context.max_depth as u32, &splitter);

        let neighbors = crate::ann::build(&matrix, Metric::Kernel, &context, 2, None);
        let map = skeletonize(&tree, &matrix, &neighbors, &context, true);

        for node in tree.preorder() {
            if node.morton == tree.root.morton {
                continue;
            }
            assert!(map.contains_key(&node.morton), "missing skeleton info for a node");
        }
    }
}
