//! Hierarchical approximate factorization: bottom-up setup and factorize,
//! producing a ULV (Cholesky-based) factor per node.
//!
//! At a leaf this assembles `K_aa = K(gids,gids) + lambda*I` and the
//! telescoping operator `U = L^-1 P^T` via a tall-thin QR; at an inner node
//! it assembles `Z = I + U_r C_rl U_l^T` from the two children's
//! telescoping operators and their cross-interaction block. Alongside the
//! Cholesky, an LU-based condition estimate is computed at every node purely
//! for the ill-conditioning warning; it doesn't feed the solve.

use nalgebra::DMatrix;

use crate::accessor::MatrixAccessor;
use crate::linalg::{self, ToleranceKind};
use crate::morton::MortonId;
use crate::runtime::RuntimeContext;
use crate::skeleton::{SkeletonInfo, SkeletonMap};
use crate::tree::{Node, Tree};

/// One node's factorization state.
pub struct NodeFactor {
    pub isleaf: bool,
    pub isroot: bool,
    pub n: usize,
    /// Cholesky factor `L` of `Z` (or `K_aa` at a leaf).
    pub cholesky: Option<nalgebra::Cholesky<f64, nalgebra::Dyn>>,
    /// Telescoping operator's explicit `Q` (`n x s`) from the tall-thin QR
    /// of `L^-1 P^T`; `None` at the root, where nothing telescopes further.
    pub q: Option<DMatrix<f64>>,
    pub condition_estimate: Option<f64>,
}

pub type FactorMap = std::collections::HashMap<MortonId, NodeFactor>;

/// Factorizes `tree` bottom-up under `matrix + lambda*I`.
pub fn factorize(tree: &Tree, matrix: &dyn MatrixAccessor, skeletons: &SkeletonMap, context: &RuntimeContext) -> FactorMap {
    let mut map = FactorMap::new();
    factorize_node(&tree.root, matrix, skeletons, context, true, &mut map);
    map
}

fn factorize_node(
    node: &Node,
    matrix: &dyn MatrixAccessor,
    skeletons: &SkeletonMap,
    context: &RuntimeContext,
    is_root: bool,
    map: &mut FactorMap,
) {
    if let Some((left, right)) = &node.children {
        factorize_node(left, matrix, skeletons, context, false, map);
        factorize_node(right, matrix, skeletons, context, false, map);
    }

    let factor = match &node.children {
        None => factorize_leaf(node, matrix, skeletons, context, is_root),
        Some((left, right)) => {
            let left_factor = map.get(&left.morton).expect("left child factor missing");
            let right_factor = map.get(&right.morton).expect("right child factor missing");
            factorize_inner(node, matrix, skeletons, left_factor, right_factor, is_root)
        }
    };

    map.insert(node.morton, factor);
}

fn factorize_leaf(node: &Node, matrix: &dyn MatrixAccessor, skeletons: &SkeletonMap, context: &RuntimeContext, is_root: bool) -> NodeFactor {
    let n = node.gids.len();
    let mut k_aa = matrix.block(&node.gids, &node.gids);
    for i in 0..n {
        k_aa[(i, i)] += context.lambda;
    }

    let lu = linalg::lu(&k_aa);
    let condition_estimate = linalg::condition_estimate(&lu);
    linalg::warn_if_ill_conditioned(&format!("leaf {}", node.morton), condition_estimate);

    let cholesky = linalg::cholesky(&k_aa);
    if cholesky.is_none() {
        log::warn!("leaf {} failed Cholesky factorization; matrix may not be SPD", node.morton);
    }

    let q = if is_root {
        None
    } else {
        match (&cholesky, skeletons.get(&node.morton)) {
            (Some(chol), Some(info)) if info.isskel => {
                let l_inv = chol.l().try_inverse().unwrap_or_else(|| DMatrix::identity(n, n));
                Some(telescope(&l_inv, &info.projector))
            }
            _ => None,
        }
    };

    NodeFactor {
        isleaf: true,
        isroot: is_root,
        n,
        cholesky,
        q,
        condition_estimate: Some(condition_estimate),
    }
}

/// Telescoping step shared by leaves and inner nodes: `U = l_inv * P^T`,
/// then keeps the explicit `Q` (`n x s`) of `U`'s tall-thin QR; `R` is
/// implicit and unused downstream.
fn telescope(l_inv: &DMatrix<f64>, projector: &DMatrix<f64>) -> DMatrix<f64> {
    let u = l_inv * projector.transpose();
    let qr = linalg::pivoted_qr(&u, 0.0, u.ncols(), ToleranceKind::Absolute);
    qr.q
}

fn factorize_inner(
    node: &Node,
    matrix: &dyn MatrixAccessor,
    skeletons: &SkeletonMap,
    left_factor: &NodeFactor,
    right_factor: &NodeFactor,
    is_root: bool,
) -> NodeFactor {
    let children = node.children.as_ref().expect("factorize_inner called on a leaf");
    let left_skel = skeletons.get(&children.0.morton);
    let right_skel = skeletons.get(&children.1.morton);

    let s_l = left_skel.map(|s| s.skeleton.len()).unwrap_or(0);
    let s_r = right_skel.map(|s| s.skeleton.len()).unwrap_or(0);
    let n = s_l + s_r;

    let mut z = DMatrix::<f64>::identity(n, n);

    if let (Some(l_skel), Some(r_skel), Some(u_l), Some(u_r)) = (left_skel, right_skel, &left_factor.q, &right_factor.q) {
        let c_rl = cross_block(matrix, l_skel, r_skel);
        let block = u_r * &c_rl * u_l.transpose();
        z.view_mut((s_l, 0), (s_r, s_l)).copy_from(&block);
        z.view_mut((0, s_l), (s_l, s_r)).copy_from(&block.transpose());
    }

    let lu = linalg::lu(&z);
    let condition_estimate = linalg::condition_estimate(&lu);
    linalg::warn_if_ill_conditioned(&format!("inner node {}", node.morton), condition_estimate);

    let cholesky = linalg::cholesky(&z);
    if cholesky.is_none() {
        log::warn!("inner node {} failed Cholesky factorization of Z", node.morton);
    }

    let q = if is_root {
        None
    } else {
        match (&cholesky, skeletons.get(&node.morton)) {
            (Some(chol), Some(info)) if info.isskel => {
                let l_inv = chol.l().try_inverse().unwrap_or_else(|| DMatrix::identity(n, n));
                Some(telescope(&l_inv, &info.projector))
            }
            _ => None,
        }
    };

    NodeFactor {
        isleaf: false,
        isroot: is_root,
        n,
        cholesky,
        q,
        condition_estimate: Some(condition_estimate),
    }
}

/// `C_rl = K(S_r, S_l)`, the cross-interaction block between the two
/// children's skeleton columns.
fn cross_block(matrix: &dyn MatrixAccessor, left: &SkeletonInfo, right: &SkeletonInfo) -> DMatrix<f64> {
    matrix.block(&right.skeleton, &left.skeleton)
}
