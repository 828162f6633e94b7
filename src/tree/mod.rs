//! The cluster tree: a complete balanced binary tree over a set of global
//! indices, built top-down with a pluggable `Splitter` and Morton-tagged by
//! preorder numbering. Depth is bounded by `D' = min(D, ceil(log2(N/m)))`;
//! a straight half-cut is used as a fallback whenever a splitter produces a
//! badly unbalanced split.

pub mod splitters;

use std::sync::Once;

use crate::morton::{self, MortonId};

pub use splitters::Splitter;

/// A single node of the cluster tree.
#[derive(Debug)]
pub struct Node {
    pub morton: MortonId,
    pub level: u32,
    /// Global indices contained in this subtree. At a leaf these are the
    /// node's own members; at an inner node, set by the bottom-up
    /// `IndexPermute` pass to `concat(left.gids, right.gids)` so the final
    /// order equals the left-to-right leaf concatenation.
    pub gids: Vec<usize>,
    pub children: Option<(Box<Node>, Box<Node>)>,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn cardinality(&self) -> usize {
        self.gids.len()
    }
}

/// The built tree, plus the per-global-index Morton id lookup used by
/// interaction-list construction.
#[derive(Debug)]
pub struct Tree {
    pub root: Node,
    pub depth: u32,
    /// `gid_to_leaf_morton[g]` is the Morton id of the leaf containing
    /// global index `g`.
    pub gid_to_leaf_morton: Vec<MortonId>,
}

static UNEVEN_SPLIT_WARNING: Once = Once::new();

/// Builds a complete balanced binary tree over `indices` using `splitter`,
/// down to depth `D' = min(max_depth, ceil(log2(N / leaf_size)))`.
pub fn build(indices: Vec<usize>, leaf_size: usize, max_depth: u32, splitter: &dyn Splitter) -> Tree {
    let n = indices.len();
    let leaf_size = leaf_size.max(1);
    let depth_for_size = if n <= leaf_size {
        0
    } else {
        ((n as f64 / leaf_size as f64).log2()).ceil() as u32
    };
    let target_depth = depth_for_size.min(max_depth);

    let n_total = n;
    let root = build_node(indices, morton::root(), 0, target_depth, splitter);

    let mut gid_to_leaf_morton = vec![morton::root(); n_total];
    collect_leaf_morton(&root, &mut gid_to_leaf_morton);

    Tree {
        root,
        depth: target_depth,
        gid_to_leaf_morton,
    }
}

fn build_node(indices: Vec<usize>, morton: MortonId, level: u32, target_depth: u32, splitter: &dyn Splitter) -> Node {
    if level >= target_depth || indices.len() <= 1 {
        return Node {
            morton,
            level,
            gids: indices,
            children: None,
        };
    }

    let (mut left_idx, mut right_idx) = splitter.split(&indices);
    if (left_idx.len() as i64 - right_idx.len() as i64).abs() > 1 {
        UNEVEN_SPLIT_WARNING.call_once(|| {
            log::warn!("splitter produced an uneven partition; falling back to a straight half-cut");
        });
        let mid = indices.len() / 2;
        left_idx = indices[..mid].to_vec();
        right_idx = indices[mid..].to_vec();
    }

    let left_morton = morton::child(morton, level, false);
    let right_morton = morton::child(morton, level, true);

    let (left, right) = if indices.len() > 4096 {
        rayon::join(
            || build_node(left_idx, left_morton, level + 1, target_depth, splitter),
            || build_node(right_idx, right_morton, level + 1, target_depth, splitter),
        )
    } else {
        (
            build_node(left_idx, left_morton, level + 1, target_depth, splitter),
            build_node(right_idx, right_morton, level + 1, target_depth, splitter),
        )
    };

    // IndexPermute: an inner node's gids are the depth-first concatenation
    // of its children's, establishing the final global reorder.
    let mut gids = Vec::with_capacity(left.gids.len() + right.gids.len());
    gids.extend_from_slice(&left.gids);
    gids.extend_from_slice(&right.gids);

    Node {
        morton,
        level,
        gids,
        children: Some((Box::new(left), Box::new(right))),
    }
}

fn collect_leaf_morton(node: &Node, out: &mut [MortonId]) {
    match &node.children {
        None => {
            for &g in &node.gids {
                out[g] = node.morton;
            }
        }
        Some((left, right)) => {
            collect_leaf_morton(left, out);
            collect_leaf_morton(right, out);
        }
    }
}

impl Tree {
    /// Visits every node in preorder (parent before children).
    pub fn preorder(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        fn visit<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
            out.push(node);
            if let Some((left, right)) = &node.children {
                visit(left, out);
                visit(right, out);
            }
        }
        visit(&self.root, &mut out);
        out
    }

    /// Visits every leaf, left to right.
    pub fn leaves(&self) -> Vec<&Node> {
        self.preorder().into_iter().filter(|n| n.is_leaf()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{CoordinateAccessor, PointCloud};
    use crate::tree::splitters::GeometrySplitter;

    #[test]
    fn build_produces_complete_balanced_tree_with_all_indices() {
        let n = 64;
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let points = PointCloud::new(1, n, data);
        let splitter = GeometrySplitter { points: &points };
        let indices: Vec<usize> = (0..n).collect();
        let tree = build(indices, 4, 10, &splitter);

        let mut seen: Vec<usize> = tree.leaves().iter().flat_map(|l| l.gids.clone()).collect();
        seen.sort();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
        assert_eq!(tree.root.gids.len(), n);

        for &g in &tree.root.gids {
            let leaf_morton = tree.gid_to_leaf_morton[g];
            assert_eq!(crate::morton::level(leaf_morton), tree.depth);
        }
    }

    #[test]
    fn leaves_respect_leaf_size_cap_within_a_factor_of_two() {
        let n = 100;
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let points = PointCloud::new(1, n, data);
        let splitter = GeometrySplitter { points: &points };
        let indices: Vec<usize> = (0..n).collect();
        let tree = build(indices, 8, 10, &splitter);
        for leaf in tree.leaves() {
            assert!(leaf.cardinality() <= 16, "leaf too large: {}", leaf.cardinality());
        }
    }

    #[test]
    fn single_point_dataset_builds_a_single_leaf() {
        let points = PointCloud::new(1, 1, vec![0.0]);
        let splitter = GeometrySplitter { points: &points };
        let tree = build(vec![0], 4, 10, &splitter);
        assert!(tree.root.is_leaf());
        assert_eq!(tree.root.gids, vec![0]);
    }

    #[test]
    fn coordinate_accessor_dim_matches_points() {
        let points = PointCloud::new(3, 2, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(points.dim(), 3);
    }
}
