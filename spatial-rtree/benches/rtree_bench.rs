//! R-Tree benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use spatial_rtree::{sort_by_hilbert, Bounds, MemoryPageStore, RTree, RTreeConfig, RowId};
use std::hint::black_box;
use tempfile::tempdir;

fn grid_rows(size: usize) -> Vec<(Bounds, RowId)> {
    (0..size)
        .map(|i| {
            let x = (i % 100) as f32;
            let y = (i / 100) as f32;
            (Bounds::new(x, y, x + 1.0, y + 1.0), i as RowId)
        })
        .collect()
}

fn bench_rtree_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("RTree Insert");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let rows = grid_rows(size);
            b.iter_with_setup(
                || RTree::in_memory(RTreeConfig::default()).unwrap(),
                |mut tree| {
                    for (bounds, id) in &rows {
                        tree.insert(*bounds, *id).unwrap();
                    }
                    black_box(tree.len())
                },
            );
        });
    }

    group.finish();
}

fn bench_file_rtree_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("File RTree Insert");

    for size in [1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let rows = grid_rows(size);
            b.iter_with_setup(
                || {
                    let dir = tempdir().unwrap();
                    let tree = RTree::create_in_dir(dir.path(), RTreeConfig::default()).unwrap();
                    (tree, dir)
                },
                |(mut tree, _dir)| {
                    for (bounds, id) in &rows {
                        tree.insert(*bounds, *id).unwrap();
                    }
                    tree.flush().unwrap();
                    black_box(tree.len())
                },
            );
        });
    }

    group.finish();
}

fn bench_rtree_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("RTree Bulk Load");

    for size in [1000, 10000, 100000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let rows = sort_by_hilbert(grid_rows(size));
            b.iter(|| {
                let config = RTreeConfig::default();
                let tree = RTree::bulk_load(
                    config,
                    MemoryPageStore::new(config.max_node_capacity),
                    MemoryPageStore::new(config.max_node_capacity),
                    rows.iter().copied(),
                )
                .unwrap();
                black_box(tree.len())
            });
        });
    }

    group.finish();
}

fn bench_rtree_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("RTree Search");

    let mut tree = RTree::in_memory(RTreeConfig::default()).unwrap();
    for (bounds, id) in grid_rows(10000) {
        tree.insert(bounds, id).unwrap();
    }

    group.bench_function("search_10k", |b| {
        b.iter(|| {
            let query = Bounds::new(25.0, 25.0, 75.0, 75.0);
            black_box(tree.query(&query).unwrap())
        });
    });

    let mut state_buffer = vec![0; 64];
    group.bench_function("scan_batches_10k", |b| {
        b.iter(|| {
            let mut state = tree.init_scan(Bounds::new(0.0, 0.0, 50.0, 50.0));
            let mut total = 0;
            loop {
                let written = tree.scan(&mut state, &mut state_buffer).unwrap();
                total += written;
                if written < state_buffer.len() {
                    break;
                }
            }
            black_box(total)
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_rtree_insert,
    bench_file_rtree_insert,
    bench_rtree_bulk_load,
    bench_rtree_search
);
criterion_main!(benches);
