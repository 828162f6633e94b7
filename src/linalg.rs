//! The dense linear-algebra backend: a thin layer over `nalgebra::DMatrix
//! <f64>` (column-major, matching the on-disk dense-matrix layout) for
//! Cholesky/LU, plus a hand-rolled column-pivoted QR ("GEQP3"), since that
//! pivoting policy is part of the algorithm under test here, not ambient
//! plumbing `nalgebra` can supply directly.

use nalgebra::{Cholesky, DMatrix, LU};

use crate::constants::CONDITION_WARN_THRESHOLD;

/// Outcome of a column-pivoted QR ("GEQP3") factorization, truncated to a
/// chosen rank `r`.
pub struct PivotedQr {
    /// `Q`, `m x r`.
    pub q: DMatrix<f64>,
    /// `R`, `r x n`: `R11` (`r x r`, upper triangular) followed by `R12`
    /// (`r x (n - r)`), both expressed in pivoted-column order.
    pub r_factor: DMatrix<f64>,
    /// Column pivot permutation: `jpvt[i]` is the original column index
    /// chosen as the `i`-th pivot.
    pub jpvt: Vec<usize>,
    /// Chosen numerical rank.
    pub rank: usize,
}

#[derive(Debug, Clone, Copy)]
pub enum ToleranceKind {
    /// Stop when the next pivot's column norm falls below `tau` itself.
    Absolute,
    /// Stop when the next pivot's column norm falls below `tau` times the
    /// first (largest) pivot norm -- the default, matching the common
    /// `xGEQP3`-based interpolative-decomposition convention.
    Relative,
}

/// Businger-Golub column-pivoted QR with early stopping once the tolerance
/// is met or the rank cap `max_rank` is reached.
///
/// This is the numerical core of `skeletonize::interpolative_decomposition`:
/// given `a` (an `m x n` sampled block, `m` rows sampled, `n` columns from
/// the merged child/leaf skeleton set), it selects up to `max_rank` columns
/// ("skeleton" columns) such that the remaining columns are well
/// approximated by them.
pub fn pivoted_qr(a: &DMatrix<f64>, tau: f64, max_rank: usize, kind: ToleranceKind) -> PivotedQr {
    let (m, n) = a.shape();
    let max_rank = max_rank.min(m).min(n);

    let mut work = a.clone();
    let mut jpvt: Vec<usize> = (0..n).collect();
    let mut col_norms: Vec<f64> = (0..n).map(|j| work.column(j).norm_squared()).collect();

    let mut q = DMatrix::<f64>::identity(m, m);
    let first_norm = col_norms.iter().cloned().fold(0.0_f64, f64::max).sqrt();
    let threshold = match kind {
        ToleranceKind::Absolute => tau,
        ToleranceKind::Relative => tau * first_norm.max(1e-300),
    };

    let mut rank = 0;
    while rank < max_rank {
        // Select the remaining column with the largest norm.
        let (piv, &best_norm_sq) = col_norms[rank..]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, v)| (i + rank, v))
            .unwrap();

        if best_norm_sq.sqrt() <= threshold {
            break;
        }

        if piv != rank {
            work.swap_columns(rank, piv);
            col_norms.swap(rank, piv);
            jpvt.swap(rank, piv);
        }

        // Householder reflector for column `rank`, rows `rank..m`.
        let mut x = work.view((rank, rank), (m - rank, 1)).clone_owned();
        let alpha = x[0].signum() * x.norm();
        if alpha != 0.0 {
            x[0] += alpha;
            let v_norm = x.norm();
            if v_norm > 1e-300 {
                let v = x / v_norm;

                // Apply reflector to the trailing columns of `work`.
                for c in rank..n {
                    let mut col = work.view_mut((rank, c), (m - rank, 1));
                    let dot = 2.0 * (v.transpose() * &col)[0];
                    col -= &v * dot;
                }

                // Accumulate into Q.
                for c in 0..m {
                    let mut col = q.view_mut((rank, c), (m - rank, 1));
                    let dot = 2.0 * (v.transpose() * &col)[0];
                    col -= &v * dot;
                }
            }
        }

        // Update trailing column norms (downdate, cheaply, from the
        // reflected block rather than recomputing from scratch).
        for c in (rank + 1)..n {
            let val = work[(rank, c)];
            col_norms[c] -= val * val;
            if col_norms[c] < 0.0 {
                col_norms[c] = 0.0;
            }
        }

        rank += 1;
    }

    // `work`'s top `rank` rows, in pivoted-column order, hold `[R11 | R12]`;
    // zero out the (already-negligible) sub-diagonal of the `R11` block so
    // downstream triangular solves see a clean upper-triangular matrix.
    let mut r_factor = work.view((0, 0), (rank, n)).clone_owned();
    for c in 0..rank {
        for r in (c + 1)..rank {
            r_factor[(r, c)] = 0.0;
        }
    }
    let q = q.transpose().view((0, 0), (m, rank)).clone_owned();

    PivotedQr {
        q,
        r_factor,
        jpvt,
        rank,
    }
}

/// Builds the interpolation matrix `P` (`rank x n`) such that
/// `A[:, jpvt] ~= A[:, jpvt[..rank]] @ [I | T]` for the `R12 = R11 * T`
/// solve, so that `K(:,B) ~= K(:,S) P` for the chosen skeleton columns `S`.
pub fn interpolation_matrix(qr: &PivotedQr, n_cols: usize) -> DMatrix<f64> {
    let rank = qr.rank;
    let mut p = DMatrix::<f64>::zeros(rank, n_cols);

    let r11 = qr.r_factor.view((0, 0), (rank, rank)).clone_owned();
    let r11_inv = r11.try_inverse().unwrap_or_else(|| DMatrix::<f64>::identity(rank, rank));

    for (local_col, &orig_col) in qr.jpvt.iter().enumerate() {
        if local_col < rank {
            p[(local_col, orig_col)] = 1.0;
        } else {
            // T column = R11^{-1} R12[:, local_col - rank], so that
            // `Q R11 [I | T] == Q [R11 | R12] == A[:, jpvt]`.
            let r12_col = qr.r_factor.column(local_col);
            let t_col = &r11_inv * r12_col;
            for r in 0..rank {
                p[(r, orig_col)] = t_col[r];
            }
        }
    }
    p
}

/// In-place Cholesky factorization of a symmetric positive-definite matrix,
/// returning `None` (a `POTRF` failure) when `a` is not numerically SPD.
pub fn cholesky(a: &DMatrix<f64>) -> Option<Cholesky<f64, nalgebra::Dyn>> {
    Cholesky::new(a.clone())
}

/// Partial-pivoted LU factorization (`GETRF`), used by the Sherman-Morrison-
/// Woodbury path and by the leaf condition-number fallback.
pub fn lu(a: &DMatrix<f64>) -> LU<f64, nalgebra::Dyn, nalgebra::Dyn> {
    a.clone().lu()
}

/// A cheap 1-norm condition-number estimate (`GECON`-equivalent) from an
/// already-computed LU factorization: the ratio of the largest to smallest
/// magnitude diagonal entries of `U`. This is not LAPACK's `dgecon`
/// (which refines the estimate via triangular solves against the computed
/// norm of the original matrix) but is the standard cheap proxy used when a
/// full inverse or extra solves aren't otherwise needed, and is sufficient
/// to drive a warn-only conditioning check.
pub fn condition_estimate(lu: &LU<f64, nalgebra::Dyn, nalgebra::Dyn>) -> f64 {
    let u = lu.u();
    let diag = u.diagonal();
    let max = diag.iter().map(|v| v.abs()).fold(0.0_f64, f64::max);
    let min = diag.iter().map(|v| v.abs()).fold(f64::INFINITY, f64::min);
    if min <= 0.0 {
        f64::INFINITY
    } else {
        max / min
    }
}

pub fn warn_if_ill_conditioned(context: &str, kappa: f64) {
    if kappa > CONDITION_WARN_THRESHOLD {
        log::warn!("{context}: condition estimate {kappa:.3e} exceeds {CONDITION_WARN_THRESHOLD:.0e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pivoted_qr_reconstructs_full_rank_square_matrix() {
        let a = DMatrix::<f64>::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0]);
        let qr = pivoted_qr(&a, 1e-12, 3, ToleranceKind::Relative);
        assert_eq!(qr.rank, 3);
        let reconstructed = &qr.q * &qr.r_factor;
        // reconstructed columns correspond to the pivoted columns of `a`.
        for (local, &orig) in qr.jpvt.iter().enumerate() {
            let diff = (reconstructed.column(local) - a.column(orig)).norm();
            assert!(diff < 1e-8, "column {orig} mismatch: {diff}");
        }
    }

    #[test]
    fn interpolation_matrix_reconstructs_low_rank_block() {
        // Rank-2 matrix: third column is a linear combination of the first two.
        let a = DMatrix::<f64>::from_row_slice(
            3,
            3,
            &[1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 2.0, 3.0, 5.0],
        );
        let qr = pivoted_qr(&a, 1e-10, 3, ToleranceKind::Relative);
        assert_eq!(qr.rank, 2);
        let p = interpolation_matrix(&qr, 3);
        let skeleton_cols: Vec<usize> = qr.jpvt[..qr.rank].to_vec();
        let skeleton = a.select_columns(&skeleton_cols);
        let reconstructed = &skeleton * &p;
        let diff = (reconstructed - &a).norm();
        assert!(diff < 1e-8, "reconstruction error {diff}");
    }

    #[test]
    fn pivoted_qr_detects_rank_deficiency() {
        // Second column is a multiple of the first -> rank 1 for a tight tolerance.
        let a = DMatrix::<f64>::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let qr = pivoted_qr(&a, 1e-6, 2, ToleranceKind::Relative);
        assert_eq!(qr.rank, 1);
    }

    #[test]
    fn cholesky_succeeds_on_spd() {
        let a = DMatrix::<f64>::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        assert!(cholesky(&a).is_some());
    }

    #[test]
    fn cholesky_fails_on_indefinite() {
        let a = DMatrix::<f64>::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(cholesky(&a).is_none());
    }
}
