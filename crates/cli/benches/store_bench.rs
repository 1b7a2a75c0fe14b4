use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use multimap::{Options, Store};
use tempfile::tempdir;

const N: usize = 1_000;

fn bench_options() -> Options {
    Options {
        length: 1 << 26,
        recover: false,
    }
}

fn fresh_store(dir: &tempfile::TempDir) -> Store {
    Store::open(dir.path().join("bench.shoal"), bench_options()).unwrap()
}

fn store_add_new_keys(c: &mut Criterion) {
    c.bench_function("store_add_new_keys_1k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = fresh_store(&dir);
                (dir, store)
            },
            |(_dir, store)| {
                for i in 0..N {
                    store
                        .add(format!("user{:06}", i), &["alice", "bob", "carol"])
                        .unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn store_grow_one_chain(c: &mut Criterion) {
    c.bench_function("store_grow_one_chain_1k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = fresh_store(&dir);
                (dir, store)
            },
            |(_dir, store)| {
                for i in 0..N {
                    store.add("hot", &[format!("nick{:06}", i)]).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn store_get_hot_key(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = fresh_store(&dir);
    for i in 0..N {
        store.add("hot", &[format!("nick{:06}", i)]).unwrap();
    }

    c.bench_function("store_get_hot_key_1k_values", |b| {
        b.iter(|| {
            criterion::black_box(store.get("hot"));
        });
    });
}

fn store_gap_churn(c: &mut Criterion) {
    c.bench_function("store_gap_churn_1k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = fresh_store(&dir);
                store.add("u", &["fill", "keep"]).unwrap();
                (dir, store)
            },
            |(_dir, store)| {
                // Delete and re-add into the same gap; no appends after setup.
                for _ in 0..N {
                    store.del("u", &["fill"]);
                    store.add("u", &["fill"]).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn store_mixed_workload(c: &mut Criterion) {
    c.bench_function("store_mixed_1k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = fresh_store(&dir);
                (dir, store)
            },
            |(_dir, store)| {
                for i in 0..N {
                    let key = format!("user{:04}", i % 100);
                    let val = format!("nick{:06}", i);
                    store.add(&key, &[val.as_str()]).unwrap();
                    criterion::black_box(store.get(&key));
                    if i % 5 == 0 {
                        store.del(&key, &[val.as_str()]);
                    }
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    store_add_new_keys,
    store_grow_one_chain,
    store_get_hot_key,
    store_gap_churn,
    store_mixed_workload,
);

criterion_main!(benches);
