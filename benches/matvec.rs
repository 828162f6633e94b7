use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;
use nalgebra::DMatrix;

use hmat::accessor::{MatrixAccessor, TestsuiteAccessor};
use hmat::tree::splitters::GeometryObliviousSplitter;
use hmat::runtime::RuntimeContext;
use hmat::{ann, interaction, matvec, skeleton, tree, Metric};

fn setup(n: usize) -> (hmat::Tree, TestsuiteAccessor, RuntimeContext) {
    let context = RuntimeContext::new(64, 32, 16, 30).with_metric(Metric::Kernel).with_seed(42);
    let matrix = TestsuiteAccessor::new(n, 42);
    let indices: Vec<usize> = (0..n).collect();
    let splitter = GeometryObliviousSplitter {
        matrix: &matrix,
        angle: false,
        seed: context.seed,
    };
    let built = tree::build(indices, context.leaf_size, context.max_depth as u32, &splitter);
    (built, matrix, context)
}

fn matvec_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("matvec");
    group.measurement_time(std::time::Duration::new(10, 0));

    for &n in &[512usize, 2048] {
        let (built, matrix, context) = setup(n);
        let neighbors = ann::build(&matrix, context.metric, &context, 4, None);
        let skeletons = skeleton::skeletonize(&built, &matrix, &neighbors, &context, true);
        let interactions = interaction::build(&built, &neighbors, &skeletons);
        let w = DMatrix::<f64>::from_fn(n, 1, |i, _| (i + 1) as f64 / n as f64);

        group.bench_function(format!("testsuite-{n}"), |b| {
            b.iter(|| matvec::matvec(&built, &matrix, &skeletons, &interactions, &w))
        });
    }

    group.finish();
}

criterion_group!(benches, matvec_bench);
criterion_main!(benches);
