//! Benchmarks for index lookups and builds.
//!
//! Run with: cargo bench -p couponidx

use couponidx::{CouponIndex, IndexBuilder};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write two overlapping source lists of `count` codes each
fn write_sources(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..2)
        .map(|s| {
            let path = dir.join(format!("coupon{}.txt", s + 1));
            let mut contents = String::with_capacity(count * 10);
            for i in 0..count {
                // Half of each list overlaps with the other
                contents.push_str(&format!("CPN{:06}\n", i + s * count / 2));
            }
            fs::write(&path, contents).unwrap();
            path
        })
        .collect()
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for count in [1_000, 100_000, 1_000_000] {
        let dir = TempDir::new().unwrap();
        let sources = write_sources(dir.path(), count);
        let out = dir.path().join("valid_codes.txt");
        IndexBuilder::new(&sources).build(&out).unwrap();
        let index = CouponIndex::open(&out).unwrap();

        let hit = format!("CPN{:06}", count / 2 + count / 4);
        let miss = "CPNXXXXXX".to_string();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("hit", count), &hit, |b, code| {
            b.iter(|| black_box(index.is_valid(black_box(code))));
        });
        group.bench_with_input(BenchmarkId::new("miss", count), &miss, |b, code| {
            b.iter(|| black_box(index.is_valid(black_box(code))));
        });
        group.bench_function(BenchmarkId::new("wrong_length", count), |b| {
            b.iter(|| black_box(index.is_valid(black_box("SHORT"))));
        });
    }

    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);

    let count = 200_000;
    let dir = TempDir::new().unwrap();
    let sources = write_sources(dir.path(), count);
    let out = dir.path().join("valid_codes.txt");

    group.throughput(Throughput::Elements((count * 2) as u64));
    for threads in [1, 2] {
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &t| {
            b.iter(|| {
                let summary = IndexBuilder::new(&sources)
                    .threads(t)
                    .build(&out)
                    .unwrap();
                black_box(summary.written)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lookup, bench_build);
criterion_main!(benches);
