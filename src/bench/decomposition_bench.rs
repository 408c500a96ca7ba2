use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use distmat::matrix::init::MatrixInit;
use distmat::{Dims, JobConfig, Strategy, run_job_with};
use std::hint::black_box;

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("decomposition");
    group.sample_size(10);

    for size in [64, 128] {
        let dims = Dims::new(size, size, size).unwrap();
        let (a, b, _) = MatrixInit::new(42).generate(dims);

        for strategy in Strategy::ALL {
            let config = JobConfig::new(dims, 4, strategy).unwrap();
            group.bench_with_input(BenchmarkId::new(strategy.to_string(), size), &config, |bench, config| {
                bench.iter(|| black_box(run_job_with(config, &a, &b).unwrap()));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_strategies);
criterion_main!(benches);
