//! Hierarchical low-rank compression, matvec and approximate
//! factorization/solve for SPD matrices.
//!
//! Module layout follows the dependency order of the algorithm itself
//! (leaves-first): matrix accessors, the cluster tree and its splitters,
//! approximate nearest neighbors, skeletonization, interaction lists, the
//! task scheduler and node views, matvec, and finally factorization/solve.

pub mod accessor;
pub mod ann;
pub mod config;
pub mod constants;
pub mod error;
pub mod factor;
pub mod interaction;
pub mod linalg;
pub mod matvec;
pub mod morton;
pub mod number;
pub mod runtime;
pub mod scheduler;
pub mod skeleton;
pub mod solve;
pub mod tree;
pub mod view;

pub use accessor::{CoordinateAccessor, MatrixAccessor, PointCloud};
pub use config::{Config, Metric, SpdSource};
pub use error::{Error, Result};
pub use number::Number;
pub use runtime::RuntimeContext;
pub use tree::Tree;
