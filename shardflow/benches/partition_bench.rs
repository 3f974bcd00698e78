//! Benchmarks for shard assignment and group keys.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use shardflow::cache::GroupKey;
use shardflow::partition::{assign, JobAssignment};

fn keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("Fe-Zn-X{i}")).collect()
}

fn bench_assign(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign");

    for total_jobs in [1u32, 16, 1024] {
        let work = keys(1000);
        group.bench_with_input(
            BenchmarkId::from_parameter(total_jobs),
            &total_jobs,
            |b, &total_jobs| {
                b.iter(|| {
                    for key in &work {
                        black_box(assign(key, total_jobs));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_is_mine(c: &mut Criterion) {
    let assignment = JobAssignment::shard(3, 8).unwrap();
    let work = keys(1000);
    c.bench_function("is_mine", |b| {
        b.iter(|| work.iter().filter(|key| assignment.is_mine(key)).count());
    });
}

fn bench_group_key(c: &mut Criterion) {
    c.bench_function("group_key_from_counts", |b| {
        b.iter(|| {
            let key = GroupKey::from_counts([("Zn", 1), ("Fe", 2), ("Cu", 0), ("Fe", 2)]);
            black_box(key)
        });
    });
}

criterion_group!(benches, bench_assign, bench_is_mine, bench_group_key);
criterion_main!(benches);
