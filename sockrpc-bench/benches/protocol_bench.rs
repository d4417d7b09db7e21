//! Protocol encoding/decoding benchmarks.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sockrpc_protocol::frame::{extract_frame, Frame, DEFAULT_MAX_FRAME_SIZE};
use sockrpc_protocol::{encode_args, parse_args, Call, Decoder, ReceiveBuffer};

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in [100, 1000, 10000] {
        let frame = Frame::call("bench", Bytes::from("x".repeat(size)));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(frame.encode()));
        });
    }

    group.finish();
}

fn bench_frame_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_extract");

    for size in [100, 1000, 10000] {
        let encoded = Frame::call("bench", Bytes::from("x".repeat(size))).encode();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buffer = ReceiveBuffer::with_capacity(encoded.len());
                buffer.write(encoded);
                black_box(extract_frame(&mut buffer, DEFAULT_MAX_FRAME_SIZE).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_chunked_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunked_decode");

    // 64 small frames delivered in 512-byte reads
    let mut stream = Vec::new();
    for i in 0..64 {
        stream.extend_from_slice(&Frame::call("echo", format!("arg{},value", i)).encode());
    }

    group.throughput(Throughput::Elements(64));
    group.bench_function("64_frames", |b| {
        let decoder = Decoder::new();
        b.iter(|| {
            let mut buffer = ReceiveBuffer::new();
            let mut frames = 0;
            for chunk in stream.chunks(512) {
                buffer.write(chunk);
                while let Some(frame) = decoder.decode_frame(&mut buffer).unwrap() {
                    black_box(&frame);
                    frames += 1;
                }
            }
            assert_eq!(frames, 64);
        });
    });

    group.finish();
}

fn bench_parse_args(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_args");

    for count in [1, 10, 100] {
        let args: Vec<String> = (0..count)
            .map(|i| {
                if i % 3 == 0 {
                    format!("quoted,{}", i)
                } else {
                    format!("plain{}", i)
                }
            })
            .collect();
        let body = encode_args(&args);

        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &body, |b, body| {
            b.iter(|| black_box(parse_args(body.as_bytes()).unwrap()));
        });
    }

    group.finish();
}

fn bench_call_decode(c: &mut Criterion) {
    let frame = Frame::call("#42:update", "user-1,\"name, with comma\",42");

    c.bench_function("call_from_frame", |b| {
        b.iter(|| black_box(Call::from_frame(&frame).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_extract,
    bench_chunked_decode,
    bench_parse_args,
    bench_call_decode,
);

criterion_main!(benches);
