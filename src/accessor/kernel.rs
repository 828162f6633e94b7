//! Kernel (Gaussian) matrix accessor induced by a point cloud, selected via
//! `--source kernel`: `K(i,j) = exp(scale * ||x_i - x_j||^2)`, `scale =
//! -0.5 / h^2`.

use std::sync::Arc;

use super::{squared_euclidean, CoordinateAccessor, MatrixAccessor, PointCloud};

#[derive(Debug, Clone)]
pub struct KernelAccessor {
    points: Arc<PointCloud>,
    scale: f64,
}

impl KernelAccessor {
    pub fn new(points: PointCloud, bandwidth: f64) -> Self {
        assert!(bandwidth > 0.0, "kernel bandwidth must be positive");
        Self {
            points: Arc::new(points),
            scale: -0.5 / (bandwidth * bandwidth),
        }
    }

    pub fn points(&self) -> &PointCloud {
        &self.points
    }
}

impl MatrixAccessor for KernelAccessor {
    fn n(&self) -> usize {
        self.points.n()
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return 1.0;
        }
        let d2 = squared_euclidean(self.points.point(i), self.points.point(j));
        (self.scale * d2).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_is_one() {
        let points = PointCloud::new(2, 3, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        let k = KernelAccessor::new(points, 1.0);
        for i in 0..3 {
            assert!((k.get(i, i) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn is_symmetric() {
        let points = PointCloud::new(2, 3, vec![0.0, 0.0, 1.0, 0.3, 0.2, 1.0]);
        let k = KernelAccessor::new(points, 0.75);
        for i in 0..3 {
            for j in 0..3 {
                assert!((k.get(i, j) - k.get(j, i)).abs() < 1e-12);
            }
        }
    }
}
