//! Benchmarks for secdrive-crypto

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use secdrive_crypto::{pack, unpack, FileCryptoEngine, KEY_SIZE};

fn bench_file_encryption(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_encryption");
    let engine = FileCryptoEngine::default();
    let key = engine.import_key(&[0x5Au8; KEY_SIZE]).unwrap();

    for size in [1024, 64 * 1024, 1024 * 1024].iter() {
        let data = vec![0u8; *size];
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("seal", size), &data, |b, data| {
            b.iter(|| engine.seal(data, &key).unwrap())
        });

        let blob = engine.seal(&data, &key).unwrap();
        group.bench_with_input(BenchmarkId::new("open", size), &blob, |b, blob| {
            b.iter(|| engine.open(blob, &key).unwrap())
        });
    }

    group.finish();
}

fn bench_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing");
    let engine = FileCryptoEngine::default();
    let key = engine.import_key(&[0x5Au8; KEY_SIZE]).unwrap();
    let (ciphertext, iv) = engine.encrypt(&vec![0u8; 1024 * 1024], &key).unwrap();

    group.throughput(Throughput::Bytes(ciphertext.len() as u64));
    group.bench_function("pack", |b| b.iter(|| pack(&iv, &ciphertext)));

    let packed = pack(&iv, &ciphertext);
    group.bench_function("unpack", |b| b.iter(|| unpack(&packed).unwrap()));

    group.finish();
}

fn bench_key_import(c: &mut Criterion) {
    let engine = FileCryptoEngine::default();
    c.bench_function("import_key", |b| {
        b.iter(|| engine.import_key(&[0x5Au8; KEY_SIZE]).unwrap())
    });
}

criterion_group!(benches, bench_file_encryption, bench_framing, bench_key_import);
criterion_main!(benches);
