//! Criterion benchmarks for WebSocket frame encode and decode throughput.
//!
//! Payload sizes cover each length tier: 7-bit, 16-bit and 64-bit.

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, black_box};
use tokio_util::codec::{Decoder, Encoder};
use wshub::{Frame, WebSocketCodec, frame::DEFAULT_MAX_PAYLOAD_LEN};

const PAYLOAD_SIZES: [(&str, usize); 3] = [("short", 64), ("medium", 4096), ("long", 256 * 1024)];

fn encoded(codec: &mut WebSocketCodec, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    if let Err(err) = codec.encode(Frame::binary(payload.to_vec()), &mut buf) {
        panic!("encode benchmark setup failed: {err}");
    }
    buf
}

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame/encode");

    for (label, len) in PAYLOAD_SIZES {
        let payload = bytes::Bytes::from(vec![0xA5_u8; len]);
        group.throughput(Throughput::Bytes(len as u64));
        for (role, mut codec) in [
            ("server", WebSocketCodec::server(DEFAULT_MAX_PAYLOAD_LEN)),
            ("client", WebSocketCodec::client(DEFAULT_MAX_PAYLOAD_LEN)),
        ] {
            let mut buf = BytesMut::with_capacity(len + 14);
            group.bench_function(BenchmarkId::new(role, label), |b| {
                b.iter(|| {
                    buf.clear();
                    if let Err(err) = codec.encode(Frame::binary(payload.clone()), &mut buf) {
                        panic!("encode failed: {err}");
                    }
                    black_box(buf.len());
                });
            });
        }
    }

    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame/decode");

    for (label, len) in PAYLOAD_SIZES {
        // Masked client frames exercise the unmasking path.
        let wire = encoded(&mut WebSocketCodec::client(DEFAULT_MAX_PAYLOAD_LEN), &vec![0x5A_u8; len]);
        let mut codec = WebSocketCodec::server(DEFAULT_MAX_PAYLOAD_LEN);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_function(BenchmarkId::from_parameter(label), |b| {
            b.iter(|| {
                let mut src = wire.clone();
                match codec.decode(&mut src) {
                    Ok(Some(frame)) => black_box(frame.payload.len()),
                    Ok(None) => panic!("decode benchmark frame incomplete"),
                    Err(err) => panic!("decode failed: {err}"),
                };
            });
        });
    }

    group.finish();
}

/// Entrypoint for frame codec benchmarks.
fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    benchmark_encode(&mut criterion);
    benchmark_decode(&mut criterion);
    criterion.final_summary();
}
