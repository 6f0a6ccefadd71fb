//! Codec and cycle benchmarks

use std::fs;

use bufsql::{BufferStore, IngestionCycle, LineCodec, MemoryStore, Record, Uploader};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tempfile::tempdir;

fn line(pairs: usize) -> String {
    let record: Record = (0..pairs)
        .map(|i| (format!("field{i}"), format!("value-{i}")))
        .collect();
    LineCodec::encode(&record)
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec-decode");

    for pairs in [1, 4, 16, 64] {
        let line = line(pairs);

        group.throughput(Throughput::Bytes(line.len() as u64));
        group.bench_function(format!("{}pairs", pairs), |b| {
            b.iter(|| black_box(LineCodec::decode(black_box(&line)).unwrap()));
        });
    }

    group.finish();
}

fn bench_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle");

    for lines in [10, 100, 1000] {
        let contents: String = (0..lines).map(|_| line(4) + "\n").collect();

        group.throughput(Throughput::Elements(lines as u64));
        group.bench_function(format!("{}lines", lines), |b| {
            b.iter_batched_ref(
                || {
                    let dir = tempdir().unwrap();
                    let path = dir.path().join("buffer.txt");
                    fs::write(&path, &contents).unwrap();
                    let buffer = BufferStore::open(&path).unwrap();
                    let cycle = IngestionCycle::new(buffer, MemoryStore::new(), Uploader::default(), 1);
                    (cycle, dir) // keep dir alive
                },
                |(cycle, _dir)| {
                    black_box(cycle.run().unwrap());
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_cycle);
criterion_main!(benches);
