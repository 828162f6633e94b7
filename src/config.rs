//! CLI / library configuration surface: a single struct derives both
//! `clap::Parser` (for the CLI) and `serde::{Serialize, Deserialize}` (so a
//! run's configuration can be embedded in the `--json` summary for
//! reproducibility).

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Splitters and ANN use stored coordinates directly.
    Geometry,
    /// Splitters and ANN use the kernel-induced (Gram) distance.
    Kernel,
    /// Splitters and ANN use the kernel-induced angle distance.
    Angle,
}

impl Metric {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "geometry" => Ok(Metric::Geometry),
            "kernel" => Ok(Metric::Kernel),
            "angle" => Ok(Metric::Angle),
            other => Err(Error::Configuration(format!("unrecognized metric `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpdSource {
    /// A small synthetic diagonally-dominant SPD matrix, for smoke tests.
    Testsuite,
    /// A user-supplied dense binary matrix file plus optional coordinates.
    Dense,
    /// A kernel matrix induced by a coordinate file and a bandwidth.
    Kernel,
}

impl SpdSource {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "testsuite" => Ok(SpdSource::Testsuite),
            "userdefine" | "dense" => Ok(SpdSource::Dense),
            "kernel" => Ok(SpdSource::Kernel),
            other => Err(Error::Configuration(format!("unrecognized spd-matrix source `{other}`"))),
        }
    }
}

/// Top-level run configuration for the CLI and library entry points.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "hmat-cli", about = "Hierarchical low-rank SPD matrix compression, matvec and solve")]
pub struct Config {
    /// Matrix order (ignored for --source=dense/kernel, inferred from the files).
    #[arg(long, default_value_t = 1024)]
    pub n: usize,

    /// Leaf size.
    #[arg(long, default_value_t = 64)]
    pub m: usize,

    /// Maximum cluster-tree depth D; the tree also stops at
    /// ceil(log2(n/m)) if that is smaller.
    #[arg(long, default_value_t = 30)]
    pub max_depth: usize,

    /// Number of randomized-tree iterations the ANN builder may run before
    /// accepting whatever recall it has reached.
    #[arg(long, default_value_t = 8)]
    pub n_tree: usize,

    /// Number of approximate nearest neighbors per point.
    #[arg(long, default_value_t = 16)]
    pub k: usize,

    /// Maximum skeleton rank.
    #[arg(long, default_value_t = 32)]
    pub s: usize,

    /// Number of right-hand sides for matvec/solve.
    #[arg(long, default_value_t = 1)]
    pub nrhs: usize,

    /// Compression tolerance.
    #[arg(long, default_value_t = 1e-4)]
    pub tau: f64,

    /// Near-field budget in [0, 1]; 1.0 means "all interactions near" (exact).
    #[arg(long, default_value_t = 0.1)]
    pub beta: f64,

    /// Regularization added to the diagonal for factorization/solve.
    #[arg(long, default_value_t = 0.0)]
    pub lambda: f64,

    #[arg(long, value_enum, default_value_t = Metric::Geometry)]
    pub metric: Metric,

    #[arg(long = "source", value_enum, default_value_t = SpdSource::Testsuite)]
    pub spd_source: SpdSource,

    /// Path to a column-major dense binary matrix (required for --source=dense).
    #[arg(long)]
    pub matrix_path: Option<String>,

    /// Path to a column-major d-by-n coordinate binary file.
    #[arg(long)]
    pub coords_path: Option<String>,

    /// Ambient dimension of the coordinate file.
    #[arg(long, default_value_t = 3)]
    pub dim: usize,

    /// Gaussian kernel bandwidth (kernel source only).
    #[arg(long, default_value_t = 1.0)]
    pub bandwidth: f64,

    /// RNG seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Rayon thread-pool size (0 = rayon default).
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Emit a single-line JSON run summary on stdout.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn runtime(&self) -> crate::runtime::RuntimeContext {
        crate::runtime::RuntimeContext::new(self.m, self.s, self.k, self.max_depth)
            .with_tolerance(self.tau)
            .with_budget(self.beta)
            .with_lambda(self.lambda)
            .with_metric(self.metric)
            .with_seed(self.seed)
    }
}
