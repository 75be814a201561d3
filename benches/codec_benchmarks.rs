//! Codec benchmarks
//!
//! Pure in-memory measurements of the framing and message codec; no server
//! is needed.
//!
//! Run with: cargo bench --bench codec_benchmarks

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pgline::protocol::{decode_backend, decode_frame, encode_into, FrontendMessage, Payload};
use pgline::ExtendedQuery;

fn data_row(cells: usize, width: usize) -> Vec<u8> {
    let mut payload = (cells as i16).to_be_bytes().to_vec();
    for _ in 0..cells {
        payload.extend_from_slice(&(width as i32).to_be_bytes());
        payload.extend(std::iter::repeat(b'x').take(width));
    }
    let mut out = vec![b'D'];
    out.extend_from_slice(&((payload.len() + 4) as i32).to_be_bytes());
    out.extend(payload);
    out
}

// ============================================================================
// Decoding
// ============================================================================

fn decode_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for rows in [100usize, 1_000, 10_000] {
        let row = data_row(8, 16);
        let stream: Vec<u8> = row.iter().copied().cycle().take(row.len() * rows).collect();

        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_data_rows", rows)),
            &stream,
            |b, stream| {
                b.iter(|| {
                    let mut buf = BytesMut::from(&stream[..]);
                    let mut decoded = 0;
                    while let Ok(Some(frame)) = decode_frame(&mut buf, false) {
                        let mut payload = Payload::new(frame.payload);
                        if decode_backend(frame.tag, &mut payload).is_ok() {
                            decoded += 1;
                        }
                    }
                    black_box(decoded)
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Encoding
// ============================================================================

fn encode_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    group.bench_function("simple_query", |b| {
        let msg = FrontendMessage::Query("SELECT id, name FROM users WHERE id = 42".into());
        let mut buf = BytesMut::with_capacity(256);
        b.iter(|| {
            buf.clear();
            encode_into(&mut buf, black_box(&msg)).ok();
            black_box(buf.len())
        });
    });

    for params in [1usize, 16, 128] {
        let mut query = ExtendedQuery::new("INSERT INTO t VALUES ($1)");
        for i in 0..params {
            query = query.param(Bytes::from(i.to_string()));
        }
        let messages = query.messages();

        group.bench_with_input(
            BenchmarkId::new("extended_query", params),
            &messages,
            |b, messages| {
                let mut buf = BytesMut::with_capacity(4096);
                b.iter(|| {
                    buf.clear();
                    for msg in messages {
                        encode_into(&mut buf, msg).ok();
                    }
                    black_box(buf.len())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, decode_benchmarks, encode_benchmarks);
criterion_main!(benches);
