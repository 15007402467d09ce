//! Store engine benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use crossbeam_utils::thread::scope;
use tkvs::{KvsEngine, ShardedKvStore, StripedKvStore};

const KEYS: i64 = 1_000;
const VALUE_SIZE: usize = 64;

fn bench_single<E: KvsEngine>(c: &mut Criterion, name: &str, engine: E) {
    let mut group = c.benchmark_group(name);
    engine.seed(KEYS + 1, VALUE_SIZE);

    group.bench_function("put_existing", |b| {
        let mut key = 0;
        b.iter(|| {
            key = key % KEYS + 1;
            engine.put(black_box(key), "value".to_owned());
        });
    });

    group.bench_function("get_existing", |b| {
        let mut key = 0;
        b.iter(|| {
            key = key % KEYS + 1;
            black_box(engine.get(black_box(key)));
        });
    });

    group.bench_function("get_missing", |b| {
        b.iter(|| black_box(engine.get(black_box(-1))));
    });

    group.bench_function("snapshot", |b| {
        b.iter(|| black_box(engine.snapshot()));
    });
    group.finish();
}

// mixed reads and writes spread over `threads` threads, one key range per thread
fn bench_contended<E: KvsEngine>(c: &mut Criterion, name: &str, engine: E) {
    let mut group = c.benchmark_group(format!("{}_threads", name));
    engine.seed(KEYS + 1, VALUE_SIZE);

    for threads in [1i64, 4, 8].iter().copied() {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                scope(|s| {
                    for t in 0..threads {
                        let engine = engine.clone();
                        s.spawn(move |_| {
                            for i in 0..100 {
                                let key = (t * 100 + i) % KEYS + 1;
                                if i % 4 == 0 {
                                    engine.put(key, "value".to_owned());
                                } else {
                                    black_box(engine.get(key));
                                }
                            }
                        });
                    }
                })
                .unwrap();
            });
        });
    }
    group.finish();
}

fn engines(c: &mut Criterion) {
    bench_single(c, "striped", StripedKvStore::new());
    bench_single(c, "sharded", ShardedKvStore::new());
    bench_contended(c, "striped", StripedKvStore::new());
    bench_contended(c, "sharded", ShardedKvStore::new());
}

criterion_group!(benches, engines);
criterion_main!(benches);
