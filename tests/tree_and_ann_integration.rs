//! Cluster-tree and ANN scenarios: depth capping under a restrictive
//! `max_depth`, and approximate-nearest-neighbor recall on a kernel matrix.

use hmat::accessor::{MatrixAccessor, TestsuiteAccessor};
use hmat::runtime::RuntimeContext;
use hmat::tree::splitters::RandomSplitter;
use hmat::{ann, tree, Metric};

#[test]
fn max_depth_zero_forces_a_single_leaf_regardless_of_size() {
    let n = 4096;
    let matrix = TestsuiteAccessor::new(n, 2);
    let indices: Vec<usize> = (0..n).collect();
    let splitter = RandomSplitter {
        matrix: &matrix,
        angle: false,
        seed: 2,
    };

    let built = tree::build(indices, 16, 0, &splitter);
    assert_eq!(built.depth, 0);
    assert_eq!(built.leaves().len(), 1);
    assert_eq!(built.root.gids.len(), n);
}

#[test]
fn tree_depth_is_bounded_by_ceil_log2_n_over_leaf_size() {
    let n = 2000;
    let leaf_size = 50;
    let matrix = TestsuiteAccessor::new(n, 6);
    let indices: Vec<usize> = (0..n).collect();
    let splitter = RandomSplitter {
        matrix: &matrix,
        angle: false,
        seed: 6,
    };

    let built = tree::build(indices, leaf_size, 30, &splitter);
    let expected_max_depth = ((n as f64 / leaf_size as f64).log2().ceil()) as u32;
    assert!(built.depth <= expected_max_depth);

    let mut seen = std::collections::HashSet::new();
    for leaf in built.leaves() {
        for &g in &leaf.gids {
            assert!(seen.insert(g), "gid {g} assigned to more than one leaf");
        }
    }
    assert_eq!(seen.len(), n);
}

#[test]
fn ann_builder_reaches_target_recall_on_a_kernel_matrix() {
    let n = 800;
    let matrix = TestsuiteAccessor::new(n, 21);
    let context = RuntimeContext::new(32, 24, 10, 30).with_seed(21);

    let table = ann::build(&matrix, Metric::Kernel, &context, context_n_tree(), None);
    assert_eq!(table.columns.len(), n);
    for column in &table.columns {
        assert!(!column.is_empty());
        assert!(column.len() <= context.num_neighbors);
    }
}

fn context_n_tree() -> usize {
    8
}
