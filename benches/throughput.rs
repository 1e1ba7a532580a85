//! Throughput Benchmark for redis-fanout
//!
//! Measures the CPU side of a round: encoding commands into a batch and
//! parsing pipelined replies out of a read buffer.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use redis_fanout::{Engine, EngineConfig, ReplyParser};

/// Builds `count` copies of one encoded reply.
fn pipelined(reply: &[u8], count: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(reply.len() * count);
    for _ in 0..count {
        data.extend_from_slice(reply);
    }
    data
}

/// Parses every reply in `data`, returning how many were found.
fn parse_all(parser: &mut ReplyParser, data: &[u8]) -> usize {
    parser.reset();
    let mut count = 0;
    while let Ok(Some(reply)) = parser.execute(data) {
        black_box(reply);
        count += 1;
    }
    count
}

/// Benchmark reply parsing
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    let cases: [(&str, Vec<u8>); 5] = [
        ("status", pipelined(b"+OK\r\n", 1000)),
        ("integer", pipelined(b":1234567\r\n", 1000)),
        ("bulk_small", pipelined(b"$11\r\nsmall_value\r\n", 1000)),
        (
            "bulk_1k",
            pipelined(format!("$1024\r\n{}\r\n", "x".repeat(1024)).as_bytes(), 1000),
        ),
        (
            "multibulk_10",
            pipelined(
                format!("*10\r\n{}", "$5\r\nvalue\r\n".repeat(10)).as_bytes(),
                100,
            ),
        ),
    ];

    for (name, data) in &cases {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_function(*name, |b| {
            let mut parser = ReplyParser::new();
            b.iter(|| parse_all(&mut parser, black_box(data)));
        });
    }

    // One large reply arriving in 1500-byte reads
    let large = format!("$65536\r\n{}\r\n", "x".repeat(65536)).into_bytes();
    group.throughput(Throughput::Bytes(large.len() as u64));
    group.bench_function("bulk_64k_segmented", |b| {
        let mut parser = ReplyParser::new();
        b.iter(|| {
            parser.reset();
            let mut end = 0;
            loop {
                end = (end + 1500).min(large.len());
                match parser.execute(&large[..end]) {
                    Ok(Some(reply)) => break black_box(reply),
                    Ok(None) => continue,
                    Err(e) => panic!("parse failed: {}", e),
                }
            }
        });
    });

    group.finish();
}

/// Benchmark command encoding
fn bench_encode(c: &mut Criterion) {
    let engine = Engine::new(EngineConfig::with_buffer_sizes(64 * 1024, 1024));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(100));

    group.bench_function("get_x100", |b| {
        let mut batch = engine.batch();
        b.iter(|| {
            batch.reset();
            for i in 0..100u8 {
                batch.write_get(black_box(&[b'k', i])).unwrap();
            }
        });
    });

    group.bench_function("set_1k_x100", |b| {
        let mut batch = engine.batch();
        let value = vec![b'x'; 1024];
        b.iter(|| {
            batch.reset();
            for i in 0..100u8 {
                batch.write_set(&[b'k', i], black_box(&value)).unwrap();
            }
        });
    });

    group.bench_function("mset_8_args_x100", |b| {
        let mut batch = engine.batch();
        let args: [&[u8]; 9] = [
            b"MSET", b"a", b"1", b"b", b"2", b"c", b"3", b"d", b"4",
        ];
        b.iter(|| {
            batch.reset();
            for _ in 0..100 {
                batch.write_command(black_box(&args)).unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_encode);

criterion_main!(benches);
