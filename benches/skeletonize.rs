use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use hmat::accessor::TestsuiteAccessor;
use hmat::runtime::RuntimeContext;
use hmat::tree::splitters::GeometryObliviousSplitter;
use hmat::{ann, skeleton, tree, Metric};

fn skeletonize_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("skeletonize");
    group.measurement_time(std::time::Duration::new(10, 0));

    for &n in &[512usize, 2048] {
        let context = RuntimeContext::new(64, 32, 16, 30).with_metric(Metric::Kernel).with_seed(42);
        let matrix = TestsuiteAccessor::new(n, 42);
        let indices: Vec<usize> = (0..n).collect();
        let splitter = GeometryObliviousSplitter {
            matrix: &matrix,
            angle: false,
            seed: context.seed,
        };
        let built = tree::build(indices, context.leaf_size, context.max_depth as u32, &splitter);
        let neighbors = ann::build(&matrix, context.metric, &context, 4, None);

        group.bench_function(format!("testsuite-{n}"), |b| {
            b.iter(|| skeleton::skeletonize(&built, &matrix, &neighbors, &context, true))
        });
    }

    group.finish();
}

criterion_group!(benches, skeletonize_bench);
criterion_main!(benches);
