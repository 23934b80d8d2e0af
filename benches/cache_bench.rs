//! Benchmarks for the cache hot paths.
//!
//! Run with: cargo bench

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::Rng;
use std::net::Ipv4Addr;
use std::sync::Arc;

use hoard::cache::{Cache, now_millis};
use hoard::dns::{DnsQuestion, DnsRecord, DnsResponse, RecordData};
use hoard::resolver::Resolver;

fn random_names(count: usize) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            format!(
                "host{}.zone{}.example",
                rng.random_range(0..1_000_000u32),
                rng.random_range(0..100u32)
            )
        })
        .collect()
}

fn build_packet(id: u16, domain: &str, answers: Vec<DnsRecord>) -> Vec<u8> {
    DnsResponse {
        id,
        flags: if answers.is_empty() { 0x0100 } else { 0x8180 },
        questions: vec![DnsQuestion {
            domain: domain.to_string(),
            qtype: 1,
            qclass: 1,
        }],
        answers,
        additionals: Vec::new(),
    }
    .to_bytes()
}

fn bench_cache_hit(c: &mut Criterion) {
    let resolver = Resolver::new(Arc::new(Cache::new()));
    let address = RecordData::A(Ipv4Addr::new(93, 184, 216, 34));
    let answer = DnsRecord::from_data("example.com", 1, 3_600, &address);
    resolver
        .process_response(&build_packet(1, "example.com", vec![answer]))
        .unwrap();
    let query = build_packet(2, "example.com", Vec::new());

    c.bench_function("process_query_hit", |b| {
        b.iter(|| resolver.process_query(black_box(&query)))
    });
}

fn bench_cache_miss(c: &mut Criterion) {
    let resolver = Resolver::new(Arc::new(Cache::new()));
    let query = build_packet(2, "missing.example", Vec::new());

    c.bench_function("process_query_miss", |b| {
        b.iter(|| resolver.process_query(black_box(&query)))
    });
}

fn bench_fold_response(c: &mut Criterion) {
    let names = random_names(1_000);
    let packets: Vec<Vec<u8>> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let address = RecordData::A(Ipv4Addr::from(i as u32));
            let answer = DnsRecord::from_data(name, 1, 300, &address);
            build_packet(i as u16, name, vec![answer])
        })
        .collect();

    let mut group = c.benchmark_group("fold");
    group.throughput(Throughput::Elements(packets.len() as u64));
    group.bench_function("process_response_1000", |b| {
        b.iter(|| {
            let resolver = Resolver::new(Arc::new(Cache::new()));
            for packet in &packets {
                let _ = resolver.process_response(black_box(packet));
            }
        })
    });
    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");

    for size in [1_000usize, 10_000] {
        let names = random_names(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &names, |b, names| {
            b.iter_batched(
                || {
                    let cache = Cache::new();
                    let created = now_millis() - 10_000;
                    {
                        let mut map = cache.lock();
                        for (i, name) in names.iter().enumerate() {
                            // Half expired, half live
                            let ttl = if i % 2 == 0 { 1 } else { 3_600 };
                            map.get_or_create(name)
                                .upsert_at(ttl, RecordData::A(Ipv4Addr::from(i as u32)), created);
                        }
                    }
                    cache
                },
                |cache| cache.sweep(),
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cache_hit,
    bench_cache_miss,
    bench_fold_response,
    bench_sweep,
);

criterion_main!(benches);
