// In zipq-core/benches/pipeline_bench.rs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use zipq::{Algorithm, EngineOptions, OffloadSession, SoftwareEngine, ZipqConfig};

// --- Mock Data Generation ---

/// Generates a vector of highly compressible data: one short pattern, repeated.
fn generate_low_entropy_bytes(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let pattern = b"abcdefgABCDEFG12345";
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

/// Generates a vector of incompressible data.
fn generate_high_entropy_bytes(size: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(0x2545_f491);
    (0..size).map(|_| rng.random::<u8>()).collect()
}

// --- Benchmark Suite ---

const BENCH_DATA_SIZE: usize = 4 * 1024 * 1024; // 4 MiB
const BENCH_BLOCK_SIZE: usize = 256 * 1024;

fn bench_pipeline_depth(c: &mut Criterion) {
    let inputs = [
        ("low_entropy", generate_low_entropy_bytes(BENCH_DATA_SIZE)),
        ("high_entropy", generate_high_entropy_bytes(BENCH_DATA_SIZE)),
    ];

    let mut group = c.benchmark_group("gzip_session");
    group.throughput(Throughput::Bytes(BENCH_DATA_SIZE as u64));
    group.sample_size(10);

    for (label, data) in &inputs {
        for depth in [1usize, 4, 16] {
            let config = ZipqConfig {
                algorithm: Algorithm::Gzip,
                block_size: BENCH_BLOCK_SIZE,
                cache_depth: depth,
                ..Default::default()
            };
            let engine = SoftwareEngine::new(EngineOptions {
                level: 1,
                ..Default::default()
            });
            let mut session = OffloadSession::new(config, engine).unwrap();

            group.bench_with_input(BenchmarkId::new(*label, depth), data, |b, data| {
                b.iter(|| session.compress_bytes(black_box(data)).unwrap())
            });
        }
    }
    group.finish();
}

fn bench_queue_spread(c: &mut Criterion) {
    let data = generate_low_entropy_bytes(BENCH_DATA_SIZE);

    let mut group = c.benchmark_group("queue_spread");
    group.throughput(Throughput::Bytes(BENCH_DATA_SIZE as u64));
    group.sample_size(10);

    for queues in [1usize, 2, 4] {
        let config = ZipqConfig {
            block_size: BENCH_BLOCK_SIZE,
            cache_depth: 8,
            queue_count: queues,
            ..Default::default()
        };
        let mut session =
            OffloadSession::new(config, SoftwareEngine::new(EngineOptions::default())).unwrap();

        group.bench_function(BenchmarkId::from_parameter(queues), |b| {
            b.iter(|| session.compress_bytes(black_box(&data)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pipeline_depth, bench_queue_spread);
criterion_main!(benches);
