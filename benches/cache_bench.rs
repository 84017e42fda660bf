//! Benchmarks for the cache subsystem.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use memo_tier::tier::memory::MemoryTier;
use memo_tier::{KeyDeriver, StoredEntry};

fn bench_key_derivation(c: &mut Criterion) {
    let deriver = KeyDeriver::new("text-embedding-3-small");
    let input = "The quick brown fox jumps over the lazy dog. ".repeat(8);

    c.bench_function("derive_key_360b", |b| {
        b.iter(|| black_box(deriver.derive(black_box(&input)).unwrap()))
    });
}

fn bench_memory_tier_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let deriver = KeyDeriver::new("bench");
    let tier = MemoryTier::new(10_000);

    let keys: Vec<_> = (0..10_000)
        .map(|i| deriver.derive(&format!("input-{i}")).unwrap())
        .collect();
    rt.block_on(async {
        for (i, key) in keys.iter().enumerate() {
            tier.put(*key, vec![i as f32; 64]).await;
        }
    });

    c.bench_function("memory_tier_get_hit_10k", |b| {
        b.iter(|| rt.block_on(async { black_box(tier.get(&keys[4321]).await) }))
    });

    c.bench_function("memory_tier_put_replace_10k", |b| {
        let key = deriver.derive("input-4321").unwrap();
        b.iter(|| rt.block_on(tier.put(black_box(key), vec![0.5; 64])))
    });
}

fn bench_entry_codec(c: &mut Criterion) {
    // 1536 dims is the common embedding width in the motivating deployment.
    let entry = StoredEntry::new(vec![0.1f32; 1536]);

    c.bench_function("entry_encode_1536d", |b| {
        b.iter(|| black_box(serde_json::to_vec(black_box(&entry)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_key_derivation,
    bench_memory_tier_hit,
    bench_entry_codec,
);
criterion_main!(benches);
