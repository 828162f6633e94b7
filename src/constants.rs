//! Crate-wide numeric and structural constants.

/// Fixed level offset used by the Morton-id encoding (`level-bits` occupy the
/// low bits, `path-bits` the high bits, after shifting by `(1 << L0) - level
/// + L0`).
pub const L0: u32 = 5;

/// Smallest value added to denominators before a division, to avoid NaNs
/// from degenerate (all-equal) clusters.
pub const EPSILON: f64 = 1e-8;

/// Default cap on leaf size growth during ANN iteration.
pub const MAX_ANN_LEAF_SIZE: usize = 2048;

/// Default number of anchors used to measure ANN recall.
pub const RECALL_ANCHORS: usize = 100;

/// Recall threshold at which the ANN builder stops iterating.
pub const RECALL_TARGET: f64 = 0.8;

/// Condition-number threshold above which a leaf Cholesky/LU factorization
/// emits a numerical warning but still proceeds.
pub const CONDITION_WARN_THRESHOLD: f64 = 1e6;
