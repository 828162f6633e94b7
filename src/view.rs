//! Per-node scratch buffers for the matvec/factor/solve traversals.
//!
//! Rather than storing buffers inline on `tree::Node` (which would force
//! every traversal to carry mutable borrows of the whole tree at once), we
//! key them by `MortonId` in side tables, the same way a cache keyed by
//! cluster id can sit beside a cluster hierarchy instead of inside it. Each
//! table is a named data view: a task declares read/write intent on a named
//! table rather than on raw memory.

use std::collections::HashMap;

use nalgebra::DMatrix;

use crate::morton::MortonId;

/// A named per-node buffer table. Writers own entries exclusively while a
/// node is being processed; after that, further accesses are read-only for
/// the remainder of the traversal. No per-entry lock is needed since the
/// traversals are purely bottom-up-then-top-down passes rather than
/// arbitrary concurrent schedules.
#[derive(Debug, Default)]
pub struct ViewTable {
    entries: HashMap<MortonId, DMatrix<f64>>,
}

impl ViewTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, node: MortonId, value: DMatrix<f64>) {
        self.entries.insert(node, value);
    }

    pub fn get(&self, node: MortonId) -> Option<&DMatrix<f64>> {
        self.entries.get(&node)
    }

    pub fn get_or_zero(&self, node: MortonId, rows: usize, cols: usize) -> DMatrix<f64> {
        self.entries
            .get(&node)
            .cloned()
            .unwrap_or_else(|| DMatrix::zeros(rows, cols))
    }

    pub fn accumulate(&mut self, node: MortonId, addend: &DMatrix<f64>) {
        self.entries
            .entry(node)
            .and_modify(|existing| *existing += addend)
            .or_insert_with(|| addend.clone());
    }
}

/// Four independent near-field output shards per leaf, reduced into the
/// final output once all shards have run.
#[derive(Debug)]
pub struct LeafShards {
    pub shards: [DMatrix<f64>; 4],
}

impl LeafShards {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            shards: std::array::from_fn(|_| DMatrix::zeros(rows, cols)),
        }
    }

    pub fn reduce(&self) -> DMatrix<f64> {
        let mut out = self.shards[0].clone();
        for shard in &self.shards[1..] {
            out += shard;
        }
        out
    }
}
