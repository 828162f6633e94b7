//! Near/far interaction lists, built from each node's near-neighbor
//! coverage and a recursive admissibility test over the Morton-id
//! containment relation in `crate::morton`.

use std::collections::{HashMap, HashSet};

use crate::ann::NeighborTable;
use crate::morton::{self, MortonId};
use crate::skeleton::SkeletonMap;
use crate::tree::{Node, Tree};

#[derive(Debug, Clone, Default)]
pub struct InteractionLists {
    pub near: HashMap<MortonId, HashSet<MortonId>>,
    pub far: HashMap<MortonId, HashSet<MortonId>>,
}

/// Builds the full near/far interaction structure for `tree`.
pub fn build(tree: &Tree, neighbors: &NeighborTable, skeletons: &SkeletonMap) -> InteractionLists {
    let mut lists = InteractionLists::default();
    build_near_lists(tree, neighbors, &mut lists);
    symmetrize(&mut lists.near);

    for leaf in tree.leaves() {
        let mut far = HashSet::new();
        evaluate_far(&tree.root, leaf, &lists, skeletons, &mut far);
        lists.far.insert(leaf.morton, far);
    }

    promote_shared_far(&tree.root, &mut lists);
    symmetrize(&mut lists.far);
    lists
}

/// Near list at leaves: `NNNear(v)` includes `v` itself and, for every
/// `j` in `v.gids` and every neighbor `i = NN(j)`, the leaf containing `i`.
fn build_near_lists(tree: &Tree, neighbors: &NeighborTable, lists: &mut InteractionLists) {
    for leaf in tree.leaves() {
        let mut set = HashSet::new();
        set.insert(leaf.morton);
        for &j in &leaf.gids {
            for &(i, _) in &neighbors.columns[j] {
                set.insert(tree.gid_to_leaf_morton[i]);
            }
        }
        lists.near.insert(leaf.morton, set);
    }
}

fn symmetrize(map: &mut HashMap<MortonId, HashSet<MortonId>>) {
    let pairs: Vec<(MortonId, MortonId)> = map
        .iter()
        .flat_map(|(&a, set)| set.iter().map(move |&b| (a, b)))
        .collect();
    for (a, b) in pairs {
        map.entry(b).or_default().insert(a);
    }
}

/// `Evaluate(u, target)`: descends from `u`, pruning into `target`'s far
/// list once `u` contains none of `target`'s near leaves, isn't an
/// ancestor of `target`, and is itself skeletonizable; recurses into
/// children otherwise.
fn evaluate_far(u: &Node, target: &Node, lists: &InteractionLists, skeletons: &SkeletonMap, far: &mut HashSet<MortonId>) {
    let near = lists.near.get(&target.morton);
    let contains_near_leaf = near
        .map(|n| n.iter().any(|&leaf_morton| morton::is_ancestor(u.morton, leaf_morton)))
        .unwrap_or(false);
    let is_ancestor_of_target = morton::is_ancestor(u.morton, target.morton);
    let is_skel = skeletons.get(&u.morton).map(|info| info.isskel).unwrap_or(false);

    let prunable = !contains_near_leaf && !is_ancestor_of_target && is_skel;

    if prunable {
        // Anti-symmetry: only the higher-Morton-id side of a pruned pair
        // records the interaction, so symmetrize() below recovers the other.
        if u.morton != target.morton && u.morton > target.morton {
            far.insert(u.morton);
        }
        return;
    }

    if let Some((left, right)) = &u.children {
        evaluate_far(left, target, lists, skeletons, far);
        evaluate_far(right, target, lists, skeletons, far);
    }
}

/// After the per-leaf far lists exist, promote any far node shared by both
/// children of an inner node up into the parent's far list, removing it
/// from the children.
fn promote_shared_far(root: &Node, lists: &mut InteractionLists) -> HashSet<MortonId> {
    match &root.children {
        None => lists.far.get(&root.morton).cloned().unwrap_or_default(),
        Some((left, right)) => {
            let left_far = promote_shared_far(left, lists);
            let right_far = promote_shared_far(right, lists);

            let shared: HashSet<MortonId> = left_far.intersection(&right_far).copied().collect();

            let left_remaining: HashSet<MortonId> = left_far.difference(&shared).copied().collect();
            let right_remaining: HashSet<MortonId> = right_far.difference(&shared).copied().collect();

            set_subtree_far(left, lists, left_remaining);
            set_subtree_far(right, lists, right_remaining);

            let mut own = lists.far.remove(&root.morton).unwrap_or_default();
            own.extend(shared.iter().copied());
            lists.far.insert(root.morton, own.clone());
            own
        }
    }
}

fn set_subtree_far(node: &Node, lists: &mut InteractionLists, far: HashSet<MortonId>) {
    if node.is_leaf() {
        lists.far.insert(node.morton, far);
    }
    // Inner-node far entries were already folded into `far` by the time
    // `promote_shared_far` returns for that subtree, so nothing further to
    // do here for non-leaves; only leaves carry a materialized far list
    // going into this pass.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::TestsuiteAccessor;
    use crate::config::Metric;
    use crate::runtime::RuntimeContext;
    use crate::tree::splitters::GeometryObliviousSplitter;

    #[test]
    fn near_lists_are_symmetric_and_contain_self() {
        let n = 64;
        let matrix = TestsuiteAccessor::new(n, 4);
        let context = RuntimeContext::new(8, 6, 4, 6).with_seed(2);
        let splitter = GeometryObliviousSplitter {
            matrix: &matrix,
            angle: false,
            seed: context.seed,
        };
        let indices: Vec<usize> = (0..n).collect();
        let tree = crate::tree::build(indices, context.leaf_size, context.max_depth as u32, &splitter);
        let neighbors = crate::ann::build(&matrix, Metric::Kernel, &context, 2, None);
        let skeletons = crate::skeleton::skeletonize(&tree, &matrix, &neighbors, &context, true);

        let lists = build(&tree, &neighbors, &skeletons);
        for leaf in tree.leaves() {
            assert!(lists.near[&leaf.morton].contains(&leaf.morton));
        }
        for (&a, set) in &lists.near {
            for &b in set {
                assert!(lists.near[&b].contains(&a), "near list not symmetric for {a}/{b}");
            }
        }
    }
}
