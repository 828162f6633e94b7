//! Hierarchical matvec `u = K * w`: N2S upward, S2S far-field, S2N
//! downward, L2L near-field, reduced into the output.
//!
//! The N2S/S2N traversals are tree-shaped by construction (a node's N2S
//! depends only on its two children; a node's S2N only on its parent), so
//! they're expressed as direct recursions -- the recursion call tree already
//! is the dependency graph. `crate::scheduler::run` is used for S2S, which
//! is genuinely all-to-all across each node's far list.

use std::collections::HashMap;
use std::sync::Mutex;

use nalgebra::DMatrix;

use crate::accessor::MatrixAccessor;
use crate::interaction::InteractionLists;
use crate::morton::MortonId;
use crate::scheduler::{self, Task};
use crate::skeleton::SkeletonMap;
use crate::tree::{Node, Tree};
use crate::view::ViewTable;

/// Computes `u = K * w` for `w` shaped `n x nrhs`.
pub fn matvec(
    tree: &Tree,
    matrix: &dyn MatrixAccessor,
    skeletons: &SkeletonMap,
    interactions: &InteractionLists,
    w: &DMatrix<f64>,
) -> DMatrix<f64> {
    let nrhs = w.ncols();
    let n = tree.root.gids.len();
    let by_morton: HashMap<MortonId, &Node> = tree.preorder().into_iter().map(|n| (n.morton, n)).collect();

    let mut w_skel = ViewTable::new();
    n2s(&tree.root, skeletons, w, &mut w_skel);

    let mut u_skel = ViewTable::new();
    s2s(matrix, skeletons, interactions, &w_skel, &mut u_skel, nrhs);

    s2n(&tree.root, skeletons, &mut u_skel, nrhs);

    let mut output = DMatrix::<f64>::zeros(n, nrhs);
    l2l_and_reduce(tree, matrix, skeletons, interactions, &u_skel, &by_morton, w, nrhs, &mut output);

    output
}

/// N2S (upward): `w_skel(v) = P(v) * w[v.gids, :]` at leaves, or
/// `P_l(v) * w_skel(left) + P_r(v) * w_skel(right)` at inner nodes.
fn n2s(node: &Node, skeletons: &SkeletonMap, w: &DMatrix<f64>, w_skel: &mut ViewTable) {
    let info = match skeletons.get(&node.morton) {
        Some(info) if info.isskel => info,
        _ => return,
    };

    let value = match &node.children {
        None => {
            let w_block = select_rows(w, &node.gids);
            &info.projector * w_block
        }
        Some((left, right)) => {
            n2s(left, skeletons, w, w_skel);
            n2s(right, skeletons, w, w_skel);

            let left_rank = skeletons.get(&left.morton).map(|s| s.skeleton.len()).unwrap_or(0);
            let right_rank = skeletons.get(&right.morton).map(|s| s.skeleton.len()).unwrap_or(0);

            let p_l = info.projector.columns(0, left_rank).clone_owned();
            let p_r = info.projector.columns(left_rank, right_rank).clone_owned();

            let w_l = w_skel.get_or_zero(left.morton, left_rank, w.ncols());
            let w_r = w_skel.get_or_zero(right.morton, right_rank, w.ncols());

            p_l * w_l + p_r * w_r
        }
    };

    w_skel.set(node.morton, value);
}

/// S2S: for each node `v` and each `f` in its far list,
/// `u_skel(v) += K(S(v), S(f)) * w_skel(f)`.
fn s2s(
    matrix: &dyn MatrixAccessor,
    skeletons: &SkeletonMap,
    interactions: &InteractionLists,
    w_skel: &ViewTable,
    u_skel: &mut ViewTable,
    nrhs: usize,
) {
    let partials: Mutex<HashMap<MortonId, DMatrix<f64>>> = Mutex::new(HashMap::new());
    let mut tasks: Vec<Task<'_>> = Vec::new();

    for (&node_morton, info) in skeletons.iter() {
        if !info.isskel {
            continue;
        }
        let far = match interactions.far.get(&node_morton) {
            Some(f) if !f.is_empty() => f,
            _ => continue,
        };

        // Sort by Morton id so the S2S sum order is deterministic across runs.
        let mut far_sorted: Vec<MortonId> = far.iter().copied().collect();
        far_sorted.sort_unstable();

        let rank = info.skeleton.len();
        let skeleton = info.skeleton.clone();

        tasks.push(Task::new(
            format!("s2s:{node_morton}"),
            far_sorted.iter().map(|f| format!("w_skel:{f}")).collect(),
            vec![format!("u_skel:{node_morton}")],
            {
                let partials = &partials;
                move || {
                    let mut acc = DMatrix::<f64>::zeros(rank, nrhs);
                    for &f in &far_sorted {
                        let f_info = match skeletons.get(&f) {
                            Some(i) if i.isskel => i,
                            _ => continue,
                        };
                        let w_f = match w_skel.get(f) {
                            Some(v) => v,
                            None => continue,
                        };
                        let k_sf = matrix.block(&skeleton, &f_info.skeleton);
                        acc += k_sf * w_f;
                    }
                    partials.lock().unwrap().insert(node_morton, acc);
                }
            },
        ));
    }

    scheduler::run(tasks);

    for (morton, value) in partials.into_inner().unwrap() {
        u_skel.accumulate(morton, &value);
    }
}

/// S2N (downward): `u_skel(left) += P_l(v)^T * u_skel(v)`, similarly for
/// `right`. Always descends regardless of whether `v` itself compressed,
/// since its children still need their own S2S contributions telescoped
/// down; only the `P^T` application is skipped for a non-skeletonized `v`
/// (the root included, which never compresses).
fn s2n(node: &Node, skeletons: &SkeletonMap, u_skel: &mut ViewTable, nrhs: usize) {
    let Some((left, right)) = &node.children else {
        return;
    };

    if let Some(info) = skeletons.get(&node.morton) {
        if info.isskel {
            let rank = info.skeleton.len();
            let u_v = u_skel.get_or_zero(node.morton, rank, nrhs);

            let left_rank = skeletons.get(&left.morton).map(|s| s.skeleton.len()).unwrap_or(0);
            let right_rank = skeletons.get(&right.morton).map(|s| s.skeleton.len()).unwrap_or(0);
            let p_l = info.projector.columns(0, left_rank).clone_owned();
            let p_r = info.projector.columns(left_rank, right_rank).clone_owned();

            u_skel.accumulate(left.morton, &(p_l.transpose() * &u_v));
            u_skel.accumulate(right.morton, &(p_r.transpose() * &u_v));
        }
    }

    s2n(left, skeletons, u_skel, nrhs);
    s2n(right, skeletons, u_skel, nrhs);
}

/// L2L (near): for each leaf, shards its near list into 4 independent
/// pieces, accumulates `K(leaf.gids, near.gids) * w[near.gids, :]` per
/// shard, then reduces the shards together with the leaf's `S2N`
/// contribution (`P(v)^T * u_skel(v)`) and scatters into `output`.
fn l2l_and_reduce(
    tree: &Tree,
    matrix: &dyn MatrixAccessor,
    skeletons: &SkeletonMap,
    interactions: &InteractionLists,
    u_skel: &ViewTable,
    by_morton: &HashMap<MortonId, &Node>,
    w: &DMatrix<f64>,
    nrhs: usize,
    output: &mut DMatrix<f64>,
) {
    let leaves = tree.leaves();

    let near_contributions: Vec<(Vec<usize>, DMatrix<f64>)> = leaves
        .iter()
        .map(|leaf| {
            let near = interactions.near.get(&leaf.morton).cloned().unwrap_or_default();
            let mut near_sorted: Vec<MortonId> = near.into_iter().collect();
            near_sorted.sort_unstable();

            let shards = shard4(&near_sorted);
            let mut total = DMatrix::<f64>::zeros(leaf.gids.len(), nrhs);
            for shard in &shards {
                for &m in shard {
                    if let Some(other) = by_morton.get(&m) {
                        let block = matrix.block(&leaf.gids, &other.gids);
                        let w_block = select_rows(w, &other.gids);
                        total += block * w_block;
                    }
                }
            }

            // The leaf's own S2N contribution: `P(v)^T * u_skel(v)`.
            if let Some(info) = skeletons.get(&leaf.morton) {
                if info.isskel {
                    let u_v = u_skel.get_or_zero(leaf.morton, info.skeleton.len(), nrhs);
                    total += info.projector.transpose() * u_v;
                }
            }

            (leaf.gids.clone(), total)
        })
        .collect();

    for (gids, contribution) in near_contributions {
        for (local, &g) in gids.iter().enumerate() {
            for c in 0..nrhs {
                output[(g, c)] += contribution[(local, c)];
            }
        }
    }
}

/// Splits `items` into (at most) 4 contiguous, roughly equal shards.
fn shard4(items: &[MortonId]) -> Vec<Vec<MortonId>> {
    if items.is_empty() {
        return vec![Vec::new(); 4];
    }
    let chunk = (items.len() + 3) / 4;
    let mut shards: Vec<Vec<MortonId>> = items.chunks(chunk.max(1)).map(|c| c.to_vec()).collect();
    while shards.len() < 4 {
        shards.push(Vec::new());
    }
    shards
}

fn select_rows(m: &DMatrix<f64>, rows: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), m.ncols(), |r, c| m[(rows[r], c)])
}
