//! `hmat-cli`: builds the cluster tree, ANN table, skeletons, interaction
//! lists, runs a matvec and (optionally) a factor/solve pass, and reports a
//! summary.

use clap::Parser;
use nalgebra::DMatrix;
use serde::Serialize;

use hmat::accessor::{DenseAccessor, KernelAccessor, MatrixAccessor, PointCloud};
use hmat::config::SpdSource;
use hmat::tree::splitters::{GeometryObliviousSplitter, GeometrySplitter};
use hmat::{ann, factor, interaction, matvec, skeleton, solve, tree, Config};

#[derive(Serialize)]
struct RunSummary {
    n: usize,
    leaf_size: usize,
    depth: u32,
    max_rank: usize,
    num_leaves: usize,
    average_skeleton_rank: f64,
    matvec_residual: Option<f64>,
}

fn main() {
    let config = Config::parse();
    init_logging(&config.log_level);

    if let Err(err) = run(&config) {
        eprintln!("hmat-cli: {err}");
        std::process::exit(1);
    }
}

fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    env_logger::Builder::from_default_env().filter_level(level).init();
}

fn run(config: &Config) -> hmat::Result<()> {
    let context = config.runtime();

    let matrix: Box<dyn MatrixAccessor> = match config.spd_source {
        SpdSource::Testsuite => Box::new(hmat::accessor::TestsuiteAccessor::new(config.n, config.seed)),
        SpdSource::Dense => {
            let path = config.matrix_path.as_ref().ok_or_else(|| {
                hmat::Error::Configuration("--source dense requires --matrix-path".to_string())
            })?;
            Box::new(DenseAccessor::from_path(path, config.n)?)
        }
        SpdSource::Kernel => {
            let coords_path = config.coords_path.as_ref().ok_or_else(|| {
                hmat::Error::Configuration("--source kernel requires --coords-path".to_string())
            })?;
            let points = load_points(coords_path, config.dim, config.n)?;
            Box::new(KernelAccessor::new(points, config.bandwidth))
        }
    };
    let n = matrix.n();

    log::info!("building cluster tree: n={n} leaf_size={} max_depth={}", context.leaf_size, context.max_depth);
    let indices: Vec<usize> = (0..n).collect();
    let built_tree = match config.metric {
        hmat::Metric::Geometry if config.coords_path.is_some() => {
            let points = load_points(config.coords_path.as_ref().unwrap(), config.dim, n)?;
            let splitter = GeometrySplitter { points: &points };
            tree::build(indices, context.leaf_size, context.max_depth as u32, &splitter)
        }
        _ => {
            let angle = matches!(config.metric, hmat::Metric::Angle);
            let splitter = GeometryObliviousSplitter {
                matrix: matrix.as_ref(),
                angle,
                seed: context.seed,
            };
            tree::build(indices, context.leaf_size, context.max_depth as u32, &splitter)
        }
    };

    log::info!("running ANN builder");
    let neighbors = ann::build(matrix.as_ref(), config.metric, &context, config.n_tree, None);

    log::info!("skeletonizing");
    let skeletons = skeleton::skeletonize(&built_tree, matrix.as_ref(), &neighbors, &context, true);

    log::info!("building interaction lists");
    let interactions = interaction::build(&built_tree, &neighbors, &skeletons);

    let w = DMatrix::<f64>::from_fn(n, config.nrhs, |i, j| ((i + 1) * (j + 1)) as f64 / n as f64);
    log::info!("running matvec");
    let u = matvec::matvec(&built_tree, matrix.as_ref(), &skeletons, &interactions, &w);

    let matvec_residual = if config.n <= 2048 {
        let dense: DMatrix<f64> = DMatrix::from_fn(n, n, |i, j| matrix.get(i, j));
        let exact = &dense * &w;
        Some((exact - &u).norm() / u.norm().max(1e-300))
    } else {
        None
    };

    if config.lambda > 0.0 {
        log::info!("factorizing");
        let factors = factor::factorize(&built_tree, matrix.as_ref(), &skeletons, &context);
        log::info!("solving");
        let _x = solve::solve(&built_tree, &factors, &w);
    }

    let ranks: Vec<usize> = skeletons.values().filter(|s| s.isskel).map(|s| s.skeleton.len()).collect();
    let average_skeleton_rank = if ranks.is_empty() {
        0.0
    } else {
        ranks.iter().sum::<usize>() as f64 / ranks.len() as f64
    };

    let summary = RunSummary {
        n,
        leaf_size: context.leaf_size,
        depth: built_tree.depth,
        max_rank: context.max_rank,
        num_leaves: built_tree.leaves().len(),
        average_skeleton_rank,
        matvec_residual,
    };

    if config.json {
        println!("{}", serde_json::to_string(&summary).map_err(|e| hmat::Error::Configuration(e.to_string()))?);
    } else {
        println!(
            "n={} depth={} leaves={} avg_rank={:.1} residual={:?}",
            summary.n, summary.depth, summary.num_leaves, summary.average_skeleton_rank, summary.matvec_residual
        );
    }

    Ok(())
}

fn load_points(path: &str, dim: usize, n: usize) -> hmat::Result<PointCloud> {
    use std::fs::File;
    use std::io::Read;

    let mut file = File::open(path)?;
    let expected = (dim * n * std::mem::size_of::<f32>()) as u64;
    let found = file.metadata()?.len();
    if found != expected {
        return Err(hmat::Error::FileSizeMismatch {
            path: path.to_string(),
            expected,
            found,
        });
    }
    let mut raw = vec![0u8; expected as usize];
    file.read_exact(&mut raw)?;
    let data: Vec<f64> = raw
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes(c.try_into().unwrap()) as f64)
        .collect();
    Ok(PointCloud::new(dim, n, data))
}
