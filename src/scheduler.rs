//! A small task-DAG scheduler: tasks declare read/write intent on named
//! buffers; the scheduler serializes writers of the same name, allows
//! concurrent readers after all prior writers, and drains to a join point
//! wave by wave using `rayon::scope`.

use std::collections::{HashMap, HashSet};

/// A unit of scheduled work: a node-scoped kernel invocation (N2S at one
/// node, an S2S accumulation, one L2L shard, ...).
pub struct Task<'a> {
    pub name: String,
    pub reads: Vec<String>,
    pub writes: Vec<String>,
    pub execute: Box<dyn FnOnce() + Send + 'a>,
}

impl<'a> Task<'a> {
    pub fn new(name: impl Into<String>, reads: Vec<String>, writes: Vec<String>, execute: impl FnOnce() + Send + 'a) -> Self {
        Self {
            name: name.into(),
            reads,
            writes,
            execute: Box::new(execute),
        }
    }
}

/// Runs `tasks` to completion, respecting the write-serializes / read-
/// concurrent dependency contract: task `b` depends on task `a` if `a`
/// writes a buffer that `b` reads or writes, and `a` was declared before
/// `b`. Ready tasks within a wave run concurrently via `rayon::scope`.
///
/// This is a direct (not work-stealing-optimal) levelized scheduler: it
/// repeatedly picks the set of tasks whose dependencies are already
/// satisfied and runs that whole set as one `rayon::scope`, which is
/// sufficient for the traversal-shaped DAGs matvec/factor/solve produce
/// (bounded depth, wide per-level fan-out) without needing a general
/// work-stealing executor.
pub fn run(mut tasks: Vec<Task<'_>>) {
    let mut last_writer: HashMap<String, usize> = HashMap::new();
    let mut deps: Vec<HashSet<usize>> = vec![HashSet::new(); tasks.len()];

    for (idx, task) in tasks.iter().enumerate() {
        for name in task.reads.iter().chain(task.writes.iter()) {
            if let Some(&writer) = last_writer.get(name) {
                if writer != idx {
                    deps[idx].insert(writer);
                }
            }
        }
        for name in &task.writes {
            last_writer.insert(name.clone(), idx);
        }
    }

    let mut done = vec![false; tasks.len()];
    let mut remaining: HashSet<usize> = (0..tasks.len()).collect();

    // Extract tasks out of the vector as they run so we can move their
    // `FnOnce` into a `rayon::scope` without fighting the borrow checker.
    let mut slots: Vec<Option<Task<'_>>> = tasks.drain(..).map(Some).collect();

    while !remaining.is_empty() {
        let ready: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|idx| deps[*idx].iter().all(|d| done[*d]))
            .collect();
        debug_assert!(!ready.is_empty(), "scheduler deadlock: cyclic buffer dependency");

        let batch: Vec<Task<'_>> = ready.iter().map(|&idx| slots[idx].take().unwrap()).collect();
        rayon::scope(|scope| {
            for task in batch {
                scope.spawn(move |_| (task.execute)());
            }
        });

        for idx in ready {
            done[idx] = true;
            remaining.remove(&idx);
        }
    }
}
