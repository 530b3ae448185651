use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dynadart::{DoubleArray, Format};

// ── Deterministic key generation ────────────────────────────────────────────

/// Small LCG so the benchmarks stay dependency-free and reproducible.
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(2).wrapping_add(1))
    }
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0
    }
    fn next_range(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

fn random_keys(n: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = Lcg::new(seed);
    let mut set = std::collections::BTreeSet::new();
    while set.len() < n {
        let len = (rng.next_range(10) + 2) as usize; // 2..=11
        let key: Vec<u8> = (0..len)
            .map(|_| (b'a' + rng.next_range(26) as u8))
            .collect();
        set.insert(key);
    }
    set.into_iter().collect()
}

fn path_keys() -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    for a in ["usr", "var", "etc", "opt", "home"] {
        for b in ["lib", "log", "run", "cache", "share"] {
            for c in 0..40 {
                keys.push(format!("/{a}/{b}/entry{c:03}").into_bytes());
            }
        }
    }
    keys
}

// ── Benchmarks ──────────────────────────────────────────────────────────────

fn bench_insert(c: &mut Criterion) {
    let keys = random_keys(50_000, 42);
    c.bench_function("insert_50k", |b| {
        b.iter(|| {
            let mut da = DoubleArray::new();
            for (i, key) in keys.iter().enumerate() {
                da.insert(black_box(key), i as i64).unwrap();
            }
            da
        });
    });
}

fn bench_get(c: &mut Criterion) {
    let keys = random_keys(50_000, 42);
    let mut da = DoubleArray::new();
    for (i, key) in keys.iter().enumerate() {
        da.insert(key, i as i64).unwrap();
    }

    let mut rng = Lcg::new(123);
    let hits: Vec<&Vec<u8>> = (0..1000)
        .map(|_| &keys[rng.next_range(keys.len() as u64) as usize])
        .collect();
    let misses: Vec<Vec<u8>> = (0..1000)
        .map(|_| {
            let len = (rng.next_range(10) + 2) as usize;
            (0..len)
                .map(|_| (b'A' + rng.next_range(26) as u8)) // uppercase: guaranteed miss
                .collect()
        })
        .collect();

    c.bench_function("get_hit_1k", |b| {
        b.iter(|| {
            for key in &hits {
                black_box(da.get(black_box(key)).ok());
            }
        });
    });

    c.bench_function("get_miss_1k", |b| {
        b.iter(|| {
            for key in &misses {
                black_box(da.get(black_box(key)).ok());
            }
        });
    });
}

fn bench_delete_reinsert(c: &mut Criterion) {
    let keys = random_keys(10_000, 7);
    c.bench_function("delete_reinsert_10k", |b| {
        let mut da = DoubleArray::new();
        for (i, key) in keys.iter().enumerate() {
            da.insert(key, i as i64).unwrap();
        }
        b.iter(|| {
            for key in &keys {
                da.delete(black_box(key)).unwrap();
            }
            for (i, key) in keys.iter().enumerate() {
                da.insert(black_box(key), i as i64).unwrap();
            }
        });
    });
}

fn bench_prefix_match(c: &mut Criterion) {
    let keys = path_keys();
    let mut da = DoubleArray::new();
    for (i, key) in keys.iter().enumerate() {
        da.insert(key, i as i64).unwrap();
    }
    let query = b"/var/log/entry007/deeper/than/any/stored/key";

    c.bench_function("prefix_match_deep_path", |b| {
        b.iter(|| {
            let ids: Vec<usize> = da.prefix_match(black_box(query)).collect();
            black_box(ids)
        });
    });
}

fn bench_prefix_predict(c: &mut Criterion) {
    let keys = path_keys();
    let mut da = DoubleArray::new();
    for (i, key) in keys.iter().enumerate() {
        da.insert(key, i as i64).unwrap();
    }

    c.bench_function("prefix_predict_subtree", |b| {
        b.iter(|| {
            let ids: Vec<usize> = da.prefix_predict(black_box(b"/var/")).collect();
            black_box(ids)
        });
    });

    c.bench_function("prefix_predict_all", |b| {
        b.iter(|| {
            let ids: Vec<usize> = da.prefix_predict(black_box(b"")).collect();
            black_box(ids)
        });
    });
}

fn bench_serial(c: &mut Criterion) {
    let keys = random_keys(50_000, 42);
    let mut da = DoubleArray::new();
    for (i, key) in keys.iter().enumerate() {
        da.insert(key, i as i64).unwrap();
    }
    let mut bytes = Vec::new();
    da.save(&mut bytes, Format::Binary).unwrap();

    c.bench_function("serial_save_binary", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            da.save(black_box(&mut buf), Format::Binary).unwrap();
            black_box(buf)
        });
    });

    c.bench_function("serial_load_binary", |b| {
        b.iter(|| {
            let loaded = DoubleArray::load(black_box(&bytes[..]), Format::Binary).unwrap();
            black_box(loaded)
        });
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_get,
    bench_delete_reinsert,
    bench_prefix_match,
    bench_prefix_predict,
    bench_serial,
);
criterion_main!(benches);
