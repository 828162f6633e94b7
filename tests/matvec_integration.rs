//! End-to-end matvec scenarios: exact matvec when the tree is a single leaf
//! (no far field at all), and approximate matvec against a dense reference
//! for random-SPD and Gaussian-kernel matrices.

use nalgebra::DMatrix;

use hmat::accessor::{DenseAccessor, KernelAccessor, MatrixAccessor, PointCloud, TestsuiteAccessor};
use hmat::runtime::RuntimeContext;
use hmat::tree::splitters::{GeometryObliviousSplitter, GeometrySplitter};
use hmat::{ann, interaction, matvec, skeleton, tree, Metric};

fn dense_reference(matrix: &dyn MatrixAccessor, w: &DMatrix<f64>) -> DMatrix<f64> {
    let n = matrix.n();
    let dense = DMatrix::from_fn(n, n, |i, j| matrix.get(i, j));
    &dense * w
}

#[test]
fn single_leaf_tree_gives_exact_matvec() {
    // n <= leaf_size: the whole matrix is near-field, so matvec must match
    // a dense `K * w` exactly (up to floating point).
    let n = 24;
    let matrix = TestsuiteAccessor::new(n, 11);
    let context = RuntimeContext::new(64, 16, 8, 30).with_seed(11);

    let indices: Vec<usize> = (0..n).collect();
    let splitter = GeometryObliviousSplitter {
        matrix: &matrix,
        angle: false,
        seed: context.seed,
    };
    let built = tree::build(indices, context.leaf_size, context.max_depth as u32, &splitter);
    assert_eq!(built.leaves().len(), 1);

    let neighbors = ann::build(&matrix, Metric::Kernel, &context, 4, None);
    let skeletons = skeleton::skeletonize(&built, &matrix, &neighbors, &context, true);
    let interactions = interaction::build(&built, &neighbors, &skeletons);

    let w = DMatrix::<f64>::from_fn(n, 2, |i, j| ((i + 1) * (j + 1)) as f64);
    let got = matvec::matvec(&built, &matrix, &skeletons, &interactions, &w);
    let want = dense_reference(&matrix, &w);

    assert!((got - want).norm() < 1e-8);
}

#[test]
fn random_spd_matvec_matches_dense_within_tolerance() {
    let n = 1024;
    let matrix = TestsuiteAccessor::new(n, 3);
    let context = RuntimeContext::new(64, 32, 16, 30).with_tolerance(1e-5).with_budget(0.1).with_seed(3);

    let indices: Vec<usize> = (0..n).collect();
    let splitter = GeometryObliviousSplitter {
        matrix: &matrix,
        angle: false,
        seed: context.seed,
    };
    let built = tree::build(indices, context.leaf_size, context.max_depth as u32, &splitter);

    let neighbors = ann::build(&matrix, Metric::Kernel, &context, 8, None);
    let skeletons = skeleton::skeletonize(&built, &matrix, &neighbors, &context, true);
    let interactions = interaction::build(&built, &neighbors, &skeletons);

    let w = DMatrix::<f64>::from_fn(n, 1, |i, _| ((i % 7) as f64 - 3.0) / 10.0);
    let got = matvec::matvec(&built, &matrix, &skeletons, &interactions, &w);
    let want = dense_reference(&matrix, &w);

    let rel_err = (&got - &want).norm() / want.norm().max(1e-300);
    assert!(rel_err < 1e-3, "relative matvec error too large: {rel_err}");
}

#[test]
fn far_lists_are_nonempty_and_partition_leaf_pairs_not_already_near() {
    // Every ordered leaf pair not already covered by near-list symmetry must
    // be covered by exactly one ancestor pair in the far lists.
    let n = 256;
    let matrix = TestsuiteAccessor::new(n, 13);
    let context = RuntimeContext::new(16, 12, 8, 20).with_seed(13);
    let splitter = GeometryObliviousSplitter {
        matrix: &matrix,
        angle: false,
        seed: context.seed,
    };
    let indices: Vec<usize> = (0..n).collect();
    let built = tree::build(indices, context.leaf_size, context.max_depth as u32, &splitter);

    let neighbors = ann::build(&matrix, Metric::Kernel, &context, 4, None);
    let skeletons = skeleton::skeletonize(&built, &matrix, &neighbors, &context, true);
    let interactions = interaction::build(&built, &neighbors, &skeletons);

    let total_far: usize = interactions.far.values().map(|s| s.len()).sum();
    assert!(total_far > 0, "far lists should not all be empty for a multi-leaf tree");

    let preorder = built.preorder();
    let leaves = built.leaves();
    for &alpha in &leaves {
        for &beta in &leaves {
            if alpha.morton == beta.morton {
                continue;
            }
            let already_near = interactions
                .near
                .get(&alpha.morton)
                .map(|s| s.contains(&beta.morton))
                .unwrap_or(false);
            if already_near {
                continue;
            }

            let alpha_ancestors: Vec<_> = preorder.iter().filter(|n| hmat::morton::is_ancestor(n.morton, alpha.morton)).collect();
            let beta_ancestors: Vec<_> = preorder.iter().filter(|n| hmat::morton::is_ancestor(n.morton, beta.morton)).collect();

            let mut hits = 0;
            for &a in &alpha_ancestors {
                for &b in &beta_ancestors {
                    if interactions.far.get(&a.morton).map(|s| s.contains(&b.morton)).unwrap_or(false) {
                        hits += 1;
                    }
                }
            }
            assert_eq!(
                hits, 1,
                "leaf pair ({}, {}) should be covered by exactly one far ancestor pair, found {hits}",
                alpha.morton, beta.morton
            );
        }
    }
}

#[test]
fn gaussian_kernel_matvec_matches_dense_within_tolerance() {
    use rand::Rng;
    use rand_chacha::rand_core::SeedableRng;

    let dim = 3;
    let n = 500;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(9);
    let coords: Vec<f64> = (0..dim * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let points = PointCloud::new(dim, n, coords);
    let matrix = KernelAccessor::new(points, 0.5);
    let context = RuntimeContext::new(32, 24, 12, 30).with_metric(Metric::Geometry).with_seed(9);

    let coord_points = matrix.points().clone();
    let indices: Vec<usize> = (0..n).collect();
    let splitter = GeometrySplitter { points: &coord_points };
    let built = tree::build(indices, context.leaf_size, context.max_depth as u32, &splitter);

    let neighbors = ann::build(&matrix, Metric::Geometry, &context, 6, None);
    let skeletons = skeleton::skeletonize(&built, &matrix, &neighbors, &context, true);
    let interactions = interaction::build(&built, &neighbors, &skeletons);

    let w = DMatrix::<f64>::from_fn(n, 1, |i, _| ((i % 5) as f64) / 5.0);
    let got = matvec::matvec(&built, &matrix, &skeletons, &interactions, &w);
    let want = dense_reference(&matrix, &w);

    let rel_err = (&got - &want).norm() / want.norm().max(1e-300);
    assert!(rel_err < 0.1, "relative matvec error too large: {rel_err}");
}

#[test]
fn dense_accessor_from_symmetric_dense_round_trips() {
    let n = 4;
    let k = vec![
        4.0, 1.0, 0.0, 0.0, //
        1.0, 4.0, 1.0, 0.0, //
        0.0, 1.0, 4.0, 1.0, //
        0.0, 0.0, 1.0, 4.0, //
    ];
    let matrix = DenseAccessor::from_symmetric_dense(n, k.clone());
    for i in 0..n {
        for j in 0..n {
            assert!((matrix.get(i, j) - k[j * n + i]).abs() < 1e-12);
        }
    }
}
