//! Matrix accessors: the concrete dense-linear-algebra backend and the
//! `K(i,j)`/`K(I,J)` matrix accessor are modeled through a capability set
//! (element access, block access, optional importance sampling) rather than
//! through runtime dispatch in hot paths. `MatrixAccessor` is a `dyn` trait
//! object selected once at construction and passed down explicitly, rather
//! than matched on a tag inside the tree/skeletonization code.

mod dense;
mod kernel;
mod testsuite;

pub use dense::DenseAccessor;
pub use kernel::KernelAccessor;
pub use testsuite::TestsuiteAccessor;

use nalgebra::DMatrix;
use rand::RngCore;

/// Evaluates entries and blocks of an implicit or explicit SPD matrix `K`.
pub trait MatrixAccessor: std::fmt::Debug + Send + Sync {
    /// The order of the matrix.
    fn n(&self) -> usize;

    /// A single entry `K(i, j)`.
    fn get(&self, i: usize, j: usize) -> f64;

    /// A dense `|rows| x |cols|` block `K(rows, cols)`, column-major to match
    /// the dense-linear-algebra backend's native layout.
    fn block(&self, rows: &[usize], cols: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(rows.len(), cols.len(), |r, c| self.get(rows[r], cols[c]))
    }

    /// Returns an importance-weighted `(value, row_index)` sample for
    /// column `j`, used to drive the geometry-oblivious splitter and the
    /// skeleton row-sampling fallback when `snids` is exhausted. The default
    /// implementation samples uniformly at random; accessors with a better
    /// notion of "important" (e.g. large-magnitude kernel entries) may
    /// override it.
    fn important_sample(&self, j: usize, rng: &mut dyn RngCore) -> (f64, usize) {
        let i = (rng.next_u64() as usize) % self.n();
        (self.get(i, j), i)
    }
}

/// Optional coordinate accessor `X(:, i)`, available when the matrix is
/// induced by a point cloud (geometry or kernel metrics).
pub trait CoordinateAccessor: std::fmt::Debug + Send + Sync {
    fn dim(&self) -> usize;
    fn point(&self, i: usize) -> &[f64];
}

/// A plain in-memory point cloud, column-major (`dim x n`).
#[derive(Debug, Clone)]
pub struct PointCloud {
    dim: usize,
    n: usize,
    data: Vec<f64>,
}

impl PointCloud {
    pub fn new(dim: usize, n: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), dim * n, "point cloud data length mismatch");
        Self { dim, n, data }
    }

    pub fn n(&self) -> usize {
        self.n
    }
}

impl CoordinateAccessor for PointCloud {
    fn dim(&self) -> usize {
        self.dim
    }

    fn point(&self, i: usize) -> &[f64] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }
}

pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
