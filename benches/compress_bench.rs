//! Performance benchmarks for routing table compression.
//!
//! Measures:
//! - KeyMask merge and intersection
//! - BitSet add/contains over table-sized index sets
//! - Default-route elision
//! - Ordered covering on random tables of increasing size
//! - Full orchestrator runs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::SeedableRng;
use routing_compressor::utils::{random_table, random_table_with_defaults};
use routing_compressor::{
    elide_default_routes, AliasMap, BitSet, Compressor, CompressorConfig, ControlFlags, KeyMask,
    MemoryPool, OrderedCovering, RouterCam, RoutingTable, TableBuffer,
};
use std::sync::Arc;

// =============================================================================
// KeyMask Operations
// =============================================================================

fn bench_key_mask(c: &mut Criterion) {
    let a = KeyMask::new(0x0000_1200, 0xFFFF_FF00);
    let b = KeyMask::new(0x0000_1300, 0xFFFF_FF00);

    c.bench_function("key_mask_merge", |bench| {
        bench.iter(|| black_box(a).merge(black_box(&b)));
    });

    c.bench_function("key_mask_intersects", |bench| {
        bench.iter(|| black_box(a).intersects(black_box(&b)));
    });
}

// =============================================================================
// BitSet Operations
// =============================================================================

fn bench_bitset(c: &mut Criterion) {
    let pool = MemoryPool::unbounded();
    let mut set = BitSet::new(4096, &pool).unwrap();

    c.bench_function("bitset_add_contains", |b| {
        let mut i = 0;
        b.iter(|| {
            set.add(black_box(i % 4096));
            let _ = set.contains(black_box((i * 7) % 4096));
            i += 1;
        });
    });
}

// =============================================================================
// Default Route Elision
// =============================================================================

fn bench_elision(c: &mut Criterion) {
    let mut group = c.benchmark_group("elide_default_routes");
    let pool = MemoryPool::unbounded();

    for size in [64, 256, 1024].iter() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let entries = random_table_with_defaults(&mut rng, *size, 16);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut table = RoutingTable::from_entries(entries.clone());
                elide_default_routes(&mut table, &pool).unwrap()
            });
        });
    }
    group.finish();
}

// =============================================================================
// Ordered Covering
// =============================================================================

fn bench_ordered_covering(c: &mut Criterion) {
    let mut group = c.benchmark_group("ordered_covering");
    group.sample_size(20);

    for size in [64, 256, 1024].iter() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let entries = random_table(&mut rng, *size, 12, 8);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut table = RoutingTable::from_entries(entries.clone());
                let mut oc =
                    OrderedCovering::new(MemoryPool::unbounded(), Arc::new(ControlFlags::new()));
                oc.minimise(&mut table, 0, &mut AliasMap::new()).unwrap()
            });
        });
    }
    group.finish();
}

// =============================================================================
// Full Runs
// =============================================================================

fn bench_compressor(c: &mut Criterion) {
    let mut group = c.benchmark_group("compressor_run");
    group.sample_size(20);

    for size in [256, 1024].iter() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let buffer = TableBuffer::new(1, random_table_with_defaults(&mut rng, *size, 12));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut compressor =
                    Compressor::new(CompressorConfig::new(size / 2), RouterCam::new(size));
                compressor.run(black_box(&buffer)).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_key_mask,
    bench_bitset,
    bench_elision,
    bench_ordered_covering,
    bench_compressor
);

criterion_main!(benches);
