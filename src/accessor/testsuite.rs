//! Synthetic diagonally-dominant SPD accessor used for the `testsuite`
//! source and smoke tests. Deterministic given a seed, using a seeded
//! `ChaCha8Rng` rather than thread-local randomness.

use nalgebra::DMatrix;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::MatrixAccessor;

#[derive(Debug)]
pub struct TestsuiteAccessor {
    n: usize,
    data: Vec<f64>,
}

impl TestsuiteAccessor {
    /// Builds `K = A A^T + n I` for a random dense `A`, which is SPD and
    /// diagonally dominant by construction.
    pub fn new(n: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let a = DMatrix::<f64>::from_fn(n, n, |_, _| rng.gen_range(-1.0..1.0));
        let mut k = &a * a.transpose();
        for i in 0..n {
            k[(i, i)] += n as f64;
        }

        // nalgebra::DMatrix is column-major, matching our storage convention.
        let data = k.as_slice().to_vec();

        Self { n, data }
    }

    #[inline]
    fn index(&self, i: usize, j: usize) -> usize {
        j * self.n + i
    }
}

impl MatrixAccessor for TestsuiteAccessor {
    fn n(&self) -> usize {
        self.n
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.index(i, j)]
    }
}
