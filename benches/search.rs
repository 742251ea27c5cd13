use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use datasanity::embeddings::HashingEncoder;
use datasanity::index::VectorIndex;
use std::hint::black_box;

const DIMENSION: usize = 384;

pub fn criterion_benchmark(c: &mut Criterion) {
    let encoder = HashingEncoder::new(DIMENSION).expect("valid dimension");
    let query = encoder.embed("Grace Hopper New York Admiral");

    let mut group = c.benchmark_group("search");
    for size in [1_000_usize, 10_000] {
        let vectors = (0..size)
            .map(|i| encoder.embed(&format!("Person {i} City {} Occupation {}", i % 250, i % 40)))
            .collect();
        let index = VectorIndex::build(vectors).expect("benchmark index builds");

        group.bench_with_input(BenchmarkId::from_parameter(size), &index, |b, index| {
            b.iter(|| index.search(black_box(&query), 10));
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
