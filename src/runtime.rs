//! Explicit runtime configuration, passed to top-level operations instead of
//! relying on process-wide global state.

use rand_chacha::ChaCha8Rng;
use rand_chacha::rand_core::SeedableRng;

use crate::config::Metric;

/// Shared, explicit context for a single build/matvec/factor/solve run.
///
/// Rather than reading a global `RAYON_NUM_THREADS` or seeding
/// `rand::thread_rng()` implicitly (as ad-hoc scripts do), every
/// tree/ANN/skeletonization/matvec/factor entry point takes a
/// `&RuntimeContext` and threads it down explicitly instead of reaching for
/// a singleton.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub leaf_size: usize,
    pub max_rank: usize,
    pub num_neighbors: usize,
    pub max_depth: usize,
    pub tolerance: f64,
    pub budget: f64,
    pub lambda: f64,
    pub metric: Metric,
    pub seed: u64,
}

impl RuntimeContext {
    pub fn new(leaf_size: usize, max_rank: usize, num_neighbors: usize, max_depth: usize) -> Self {
        Self {
            leaf_size,
            max_rank,
            num_neighbors,
            max_depth,
            tolerance: 1e-6,
            budget: 1.0,
            lambda: 0.0,
            metric: Metric::Geometry,
            seed: 42,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// A fresh, deterministically-seeded RNG derived from `self.seed` and a
    /// caller-supplied stream id, so independent call sites (splitters, ANN
    /// iterations, row sampling) don't perturb each other's randomness when
    /// run out of order.
    pub fn rng(&self, stream: u64) -> ChaCha8Rng {
        seeded_rng(self.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(stream))
    }
}

/// Builds a deterministic RNG from a raw seed, for call sites (splitters)
/// that receive a derived seed directly rather than a full `RuntimeContext`.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}
