use applog::AppendLog;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::fs::OpenOptions;
use tempfile::tempdir;

const N: usize = 5_000;
const RECORD_SIZE: usize = 100;

fn applog_append(c: &mut Criterion) {
    c.bench_function("applog_append_5k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let file = OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .open(dir.path().join("log"))
                    .unwrap();
                let log = AppendLog::new(file).unwrap();
                (dir, log)
            },
            |(_dir, mut log)| {
                let buf = vec![b'x'; RECORD_SIZE];
                for _ in 0..N {
                    log.append(&buf).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn applog_append_small(c: &mut Criterion) {
    c.bench_function("applog_append_small_5k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let file = OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .open(dir.path().join("log"))
                    .unwrap();
                let log = AppendLog::new(file).unwrap();
                (dir, log)
            },
            |(_dir, mut log)| {
                for i in 0..N as u64 {
                    log.append(format!("v{}", i).as_bytes()).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, applog_append, applog_append_small);
criterion_main!(benches);
