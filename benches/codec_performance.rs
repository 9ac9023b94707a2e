//! Criterion benchmarks for frame encoding and reassembly.
//!
//! Covers encoding requests, decoding a stream of replies fed in one chunk,
//! and decoding the same stream split into small transport-sized chunks.

use criterion::{BenchmarkId, Criterion, Throughput, black_box};
use qrc::{FrameBuffer, Request, codec::encode_frame};
use serde_json::{Value, json};

const CHUNK_SIZES: [usize; 3] = [16, 512, 8192];

fn reply_stream(frames: usize, controls: usize) -> Vec<u8> {
    let controls: Vec<Value> = (0..controls)
        .map(|i| json!({"Name": format!("gain{i}"), "Value": -12.5, "String": "-12.5dB"}))
        .collect();
    let mut stream = Vec::new();
    for id in 0..frames {
        let reply = json!({"jsonrpc": "2.0", "id": id, "result": {"Name": "Mixer", "Controls": controls}});
        match encode_frame(&reply) {
            Ok(frame) => stream.extend_from_slice(&frame),
            Err(err) => panic!("benchmark setup failed: {err}"),
        }
    }
    stream
}

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/encode");
    for controls in [1usize, 64] {
        let names: Vec<Value> = (0..controls).map(|i| json!(format!("gain{i}"))).collect();
        let request = Request::new("Control.Get").with_params(Value::Array(names));
        group.bench_function(BenchmarkId::from_parameter(controls), |b| {
            b.iter(|| black_box(encode_frame(&request.envelope(black_box(7)))));
        });
    }
    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/decode");
    let stream = reply_stream(64, 16);
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("single_chunk", |b| {
        b.iter(|| {
            let mut buffer = FrameBuffer::default();
            black_box(buffer.feed(black_box(&stream)))
        });
    });

    for chunk in CHUNK_SIZES {
        group.bench_function(BenchmarkId::new("chunked", chunk), |b| {
            b.iter(|| {
                let mut buffer = FrameBuffer::default();
                let mut decoded = 0usize;
                for piece in stream.chunks(chunk) {
                    if let Ok(frames) = buffer.feed(piece) {
                        decoded += frames.len();
                    }
                }
                black_box(decoded)
            });
        });
    }
    group.finish();
}

/// Entrypoint for codec benchmarks.
fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    benchmark_encode(&mut criterion);
    benchmark_decode(&mut criterion);
    criterion.final_summary();
}
