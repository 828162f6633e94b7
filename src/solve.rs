//! Approximate solve `x ~= K^-1 rhs`: partitions `rhs` into per-leaf views,
//! then runs the ULV forward (bottom-up) and backward (top-down) passes.

use nalgebra::DMatrix;

use crate::factor::FactorMap;
use crate::tree::{Node, Tree};
use crate::view::ViewTable;

/// Solves `K x ~= rhs` approximately (`rhs` shaped `n x nrhs`) using the
/// factorization in `factors`.
pub fn solve(tree: &Tree, factors: &FactorMap, rhs: &DMatrix<f64>) -> DMatrix<f64> {
    let nrhs = rhs.ncols();
    let n = tree.root.gids.len();

    // TreeView: partition `rhs` into per-leaf views by forward permutation.
    let mut leaf_input = ViewTable::new();
    for leaf in tree.leaves() {
        leaf_input.set(leaf.morton, select_rows(rhs, &leaf.gids));
    }

    // Forward pass: `solved` holds each node's own `x` (needed again during
    // the backward pass); `upward` holds `Q^T x`, the value consumed by the
    // *parent's* forward solve.
    let mut solved = ViewTable::new();
    let mut upward = ViewTable::new();
    ulv_forward(&tree.root, factors, &leaf_input, &mut solved, &mut upward);

    let mut parent_out = ViewTable::new();
    ulv_backward(&tree.root, factors, &mut solved, &mut parent_out, None);

    let mut output = DMatrix::<f64>::zeros(n, nrhs);
    for leaf in tree.leaves() {
        if let Some(x) = solved.get(leaf.morton) {
            scatter_rows(&mut output, &leaf.gids, x);
        }
    }
    output
}

/// ULV forward (bottom-up): leaves solve `L x = rhs[gids]`; inner nodes
/// solve `L x = b_skel`, where `b_skel` is the stack of the children's
/// upward (`Q^T x`) contributions; every non-root node then records its own
/// `Q^T x` into `upward` for its parent to consume.
fn ulv_forward(node: &Node, factors: &FactorMap, leaf_input: &ViewTable, solved: &mut ViewTable, upward: &mut ViewTable) {
    if let Some((left, right)) = &node.children {
        ulv_forward(left, factors, leaf_input, solved, upward);
        ulv_forward(right, factors, leaf_input, solved, upward);
    }

    let factor = match factors.get(&node.morton) {
        Some(f) => f,
        None => return,
    };

    let b = if node.is_leaf() {
        leaf_input.get(node.morton).cloned()
    } else {
        let (left, right) = node.children.as_ref().unwrap();
        match (upward.get(left.morton), upward.get(right.morton)) {
            (Some(l), Some(r)) => {
                let mut stacked = DMatrix::zeros(l.nrows() + r.nrows(), l.ncols());
                stacked.view_mut((0, 0), (l.nrows(), l.ncols())).copy_from(l);
                stacked.view_mut((l.nrows(), 0), (r.nrows(), r.ncols())).copy_from(r);
                Some(stacked)
            }
            _ => None,
        }
    };

    let Some(b) = b else { return };
    let Some(chol) = &factor.cholesky else { return };

    let x = chol.l().solve_lower_triangular(&b).unwrap_or(b);
    if !factor.isroot {
        if let Some(q) = &factor.q {
            upward.set(node.morton, q.transpose() * &x);
        }
    }
    solved.set(node.morton, x);
}

/// ULV backward (top-down): if not root, fold in `Q * parent_out`; solve
/// `L^T x = b_skel` in place, overwriting `solved`; inner nodes then split
/// the result and hand each half down as the child's incoming contribution.
fn ulv_backward(node: &Node, factors: &FactorMap, solved: &mut ViewTable, parent_out: &mut ViewTable, incoming: Option<&DMatrix<f64>>) {
    let factor = match factors.get(&node.morton) {
        Some(f) => f,
        None => return,
    };

    let mut b = match solved.get(node.morton) {
        Some(b) => b.clone(),
        None => return,
    };
    if !factor.isroot {
        if let (Some(q), Some(parent)) = (&factor.q, incoming) {
            b += q * parent;
        }
    }

    let Some(chol) = &factor.cholesky else { return };
    let x = chol.l().transpose().solve_upper_triangular(&b).unwrap_or(b);
    solved.set(node.morton, x.clone());

    if let Some((left, right)) = &node.children {
        let s_l = factors.get(&left.morton).map(|f| f.n).unwrap_or(0).min(x.nrows());
        let left_out = x.rows(0, s_l).clone_owned();
        let right_out = x.rows(s_l, x.nrows() - s_l).clone_owned();
        parent_out.set(left.morton, left_out.clone());
        parent_out.set(right.morton, right_out.clone());
        ulv_backward(left, factors, solved, parent_out, Some(&left_out));
        ulv_backward(right, factors, solved, parent_out, Some(&right_out));
    }
}

fn select_rows(m: &DMatrix<f64>, rows: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), m.ncols(), |r, c| m[(rows[r], c)])
}

fn scatter_rows(out: &mut DMatrix<f64>, rows: &[usize], values: &DMatrix<f64>) {
    for (local, &g) in rows.iter().enumerate() {
        for c in 0..values.ncols() {
            out[(g, c)] = values[(local, c)];
        }
    }
}
