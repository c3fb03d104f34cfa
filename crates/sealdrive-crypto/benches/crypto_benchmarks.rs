//! Benchmarks for sealdrive-crypto

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sealdrive_crypto::{
    hashing::{content_hash, lookup_hash},
    keys::{DekKey, HashKey, KekKeyPair},
    provider::{CryptoProvider, DefaultCryptoProvider},
    signing::SigningKeyPair,
};

fn bench_hashing(c: &mut Criterion) {
    let mut group = c.benchmark_group("hashing");

    for size in [1024, 64 * 1024, 1024 * 1024].iter() {
        let data = vec![0u8; *size];
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("sha256", size), &data, |b, data| {
            b.iter(|| content_hash(data))
        });
    }

    let key = HashKey::generate();
    group.bench_function("lookup_hash", |b| b.iter(|| lookup_hash(&key, "quarterly-report.pdf")));

    group.finish();
}

fn bench_blocks(c: &mut Criterion) {
    let mut group = c.benchmark_group("blocks");
    let provider = DefaultCryptoProvider::new();
    let signer = SigningKeyPair::generate();
    let node = KekKeyPair::generate();
    let key = DekKey::generate();
    let verifier = signer.verifying_key();

    for size in [64 * 1024, 1024 * 1024, 4 * 1024 * 1024].iter() {
        let data = vec![0u8; *size];
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("encrypt_block", size), &data, |b, data| {
            b.iter(|| {
                provider
                    .encrypt_block(data, &key, node.public_key(), &signer)
                    .unwrap()
            })
        });

        let block = provider
            .encrypt_block(&data, &key, node.public_key(), &signer)
            .unwrap();
        group.bench_with_input(BenchmarkId::new("decrypt_block", size), &block, |b, block| {
            b.iter(|| {
                provider
                    .decrypt_block(
                        &block.ciphertext,
                        &block.encrypted_signature,
                        &key,
                        &node,
                        &verifier,
                    )
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_node_keys(c: &mut Criterion) {
    let provider = DefaultCryptoProvider::new();
    let signer = SigningKeyPair::generate();
    let parent = KekKeyPair::generate();
    let verifier = signer.verifying_key();

    c.bench_function("generate_node_keys", |b| {
        b.iter(|| provider.generate_node_keys(parent.public_key(), &signer).unwrap())
    });

    let generated = provider
        .generate_node_keys(parent.public_key(), &signer)
        .unwrap();
    c.bench_function("unlock_node_key", |b| {
        b.iter(|| {
            provider
                .unlock_node_key(
                    &generated.locked_key,
                    &generated.encrypted_passphrase,
                    &generated.passphrase_signature,
                    &parent,
                    &verifier,
                )
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_hashing, bench_blocks, bench_node_keys);
criterion_main!(benches);
