//! Splitters: producing a 2-way partition of a node's local index set by
//! finding two "pole" points, projecting every member onto the pole-to-pole
//! axis, and partitioning around the projection.
//!
//! The geometry splitter locates its poles by two rounds of farthest-point
//! search over real coordinates; the geometry-oblivious and random
//! splitters instead locate their poles via
//! `MatrixAccessor::important_sample`, since `K` need not be induced by a
//! metric-space dataset with explicit coordinates.

use rand::Rng;

use crate::accessor::{squared_euclidean, CoordinateAccessor, MatrixAccessor};

/// Partitions `indices` into two roughly-equal halves, returning
/// `(left, right)`. Implementations may reorder `indices` but must not add
/// or drop entries.
pub trait Splitter: Send + Sync {
    fn split(&self, indices: &[usize]) -> (Vec<usize>, Vec<usize>);
}

/// Partitions `values` (parallel to `indices`) around their median, feeding
/// ties alternately to the smaller side so it balances even with many
/// duplicate projection values.
fn partition_around_median(indices: &[usize], values: &[f64]) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..indices.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());

    let mid = order.len() / 2;
    let median_value = values[order[mid]];

    let mut left = Vec::with_capacity(mid + 1);
    let mut right = Vec::with_capacity(indices.len() - mid);

    for &pos in &order {
        let v = values[pos];
        if v < median_value {
            left.push(indices[pos]);
        } else if v > median_value {
            right.push(indices[pos]);
        }
        // ties handled below
    }

    let mut feed_left = left.len() <= right.len();
    for &pos in &order {
        if values[pos] == median_value {
            if feed_left {
                left.push(indices[pos]);
            } else {
                right.push(indices[pos]);
            }
            feed_left = left.len() <= right.len();
        }
    }

    (left, right)
}

/// Geometry splitter: centroid -> farthest point `x0` -> farthest-from-`x0`
/// point `x1`; project onto `x1 - x0`.
pub struct GeometrySplitter<'a, C: CoordinateAccessor> {
    pub points: &'a C,
}

impl<'a, C: CoordinateAccessor> Splitter for GeometrySplitter<'a, C> {
    fn split(&self, indices: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let dim = self.points.dim();
        let mut centroid = vec![0.0; dim];
        for &i in indices {
            let p = self.points.point(i);
            for d in 0..dim {
                centroid[d] += p[d];
            }
        }
        for c in centroid.iter_mut() {
            *c /= indices.len() as f64;
        }

        let x0 = *indices
            .iter()
            .max_by(|&&a, &&b| {
                squared_euclidean(self.points.point(a), &centroid)
                    .partial_cmp(&squared_euclidean(self.points.point(b), &centroid))
                    .unwrap()
            })
            .unwrap();

        let x1 = *indices
            .iter()
            .max_by(|&&a, &&b| {
                squared_euclidean(self.points.point(a), self.points.point(x0))
                    .partial_cmp(&squared_euclidean(self.points.point(b), self.points.point(x0)))
                    .unwrap()
            })
            .unwrap();

        let p0 = self.points.point(x0);
        let p1 = self.points.point(x1);
        let axis: Vec<f64> = p1.iter().zip(p0.iter()).map(|(a, b)| a - b).collect();

        let values: Vec<f64> = indices
            .iter()
            .map(|&i| {
                let p = self.points.point(i);
                p.iter().zip(axis.iter()).map(|(x, a)| x * a).sum()
            })
            .collect();

        partition_around_median(indices, &values)
    }
}

/// Shared two-pole projection used by both the geometry-oblivious and
/// random splitters, parameterized only by how the two poles (`f2c`, `f2f`)
/// are located.
fn project_on_kernel_axis(
    matrix: &dyn MatrixAccessor,
    indices: &[usize],
    f2c: usize,
    f2f: usize,
    angle: bool,
) -> Vec<f64> {
    indices
        .iter()
        .map(|&i| {
            let raw = matrix.get(i, f2f) - matrix.get(i, f2c);
            if angle {
                (raw / matrix.get(i, i)).abs()
            } else {
                raw
            }
        })
        .collect()
}

/// Geometry-oblivious splitter: locates `f2c` (farthest from centroid,
/// approximated via importance sampling) and `f2f` (farthest from `f2c`)
/// using only `K`, then projects as above.
pub struct GeometryObliviousSplitter<'a> {
    pub matrix: &'a dyn MatrixAccessor,
    pub angle: bool,
    pub seed: u64,
}

impl<'a> Splitter for GeometryObliviousSplitter<'a> {
    fn split(&self, indices: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let mut rng = crate::runtime::seeded_rng(self.seed);
        let n_samples = ((indices.len() as f64).ln().max(1.0)).ceil() as usize;

        let temp_centroid: Vec<f64> = indices
            .iter()
            .map(|&i| {
                let mean: f64 = (0..n_samples)
                    .map(|_| self.matrix.important_sample(i, &mut rng).0)
                    .sum::<f64>()
                    / n_samples as f64;
                self.matrix.get(i, i) - 2.0 * mean
            })
            .collect();
        let f2c = indices[arg_max(&temp_centroid)];

        let temp_f2c: Vec<f64> = indices
            .iter()
            .map(|&i| self.matrix.get(i, i) - 2.0 * self.matrix.get(i, f2c))
            .collect();
        let f2f = indices[arg_max(&temp_f2c)];

        let values = project_on_kernel_axis(self.matrix, indices, f2c, f2f, self.angle);
        partition_around_median(indices, &values)
    }
}

/// Random splitter, used by the ANN iterations: two distinct poles chosen
/// uniformly at random, then the geometry-oblivious projection.
pub struct RandomSplitter<'a> {
    pub matrix: &'a dyn MatrixAccessor,
    pub angle: bool,
    pub seed: u64,
}

impl<'a> Splitter for RandomSplitter<'a> {
    fn split(&self, indices: &[usize]) -> (Vec<usize>, Vec<usize>) {
        if indices.len() < 2 {
            return (indices.to_vec(), Vec::new());
        }
        let mut rng = crate::runtime::seeded_rng(self.seed);
        let a = rng.gen_range(0..indices.len());
        let mut b = rng.gen_range(0..indices.len());
        while b == a {
            b = rng.gen_range(0..indices.len());
        }
        let f2c = indices[a];
        let f2f = indices[b];

        let values = project_on_kernel_axis(self.matrix, indices, f2c, f2f, self.angle);
        partition_around_median(indices, &values)
    }
}

fn arg_max(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_partition_balances_ties() {
        let indices = vec![0, 1, 2, 3, 4];
        let values = vec![1.0, 1.0, 1.0, 1.0, 1.0];
        let (left, right) = partition_around_median(&indices, &values);
        assert!((left.len() as i64 - right.len() as i64).abs() <= 1);
        assert_eq!(left.len() + right.len(), indices.len());
    }

    #[test]
    fn median_partition_splits_distinct_values_in_half() {
        let indices = vec![0, 1, 2, 3];
        let values = vec![0.1, 3.4, 1.2, 2.9];
        let (left, right) = partition_around_median(&indices, &values);
        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 2);
    }

    #[test]
    fn geometry_splitter_partitions_all_indices() {
        use crate::accessor::PointCloud;
        let points = PointCloud::new(1, 6, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let splitter = GeometrySplitter { points: &points };
        let indices: Vec<usize> = (0..6).collect();
        let (left, right) = splitter.split(&indices);
        assert_eq!(left.len() + right.len(), 6);
    }
}
