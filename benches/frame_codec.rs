//! Frame codec benchmark suite.
//!
//! Measures encoding and decoding at different payload sizes:
//! - Payload sizes: 16 B, 1 KiB, 64 KiB, 1 MiB
//! - Chunk sizes: whole frame, 4 KiB reads
//!
//! Run with: cargo bench --bench frame_codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use websocket_engine::{
    ConnectionToken, FrameSettings, HandshakeSettings, Opcode, ProtocolVersion, handshake_processor,
    message_processor,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_SIZES: &[usize] = &[16, 1024, 64 * 1024, 1024 * 1024];
const READ_CHUNK: usize = 4096;

// ============================================================================
// Helpers
// ============================================================================

/// Client-style masked frame carrying `size` bytes.
fn masked_frame(size: usize) -> Vec<u8> {
    let settings = FrameSettings {
        mask_outgoing: true,
        ..FrameSettings::default()
    };
    message_processor(ProtocolVersion::Rfc6455, settings)
        .build_frame(Opcode::Binary, &vec![0x5a; size])
        .expect("frame within limits")
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for &size in PAYLOAD_SIZES {
        let payload = vec![0x5a; size];
        group.throughput(Throughput::Bytes(size as u64));

        for mask in [false, true] {
            let settings = FrameSettings {
                mask_outgoing: mask,
                ..FrameSettings::default()
            };
            let processor = message_processor(ProtocolVersion::Rfc6455, settings);
            let name = if mask { "masked" } else { "unmasked" };

            group.bench_with_input(BenchmarkId::new(name, size), &payload, |b, payload| {
                b.iter(|| processor.build_frame(Opcode::Binary, black_box(payload)));
            });
        }
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let processor = message_processor(ProtocolVersion::Rfc6455, FrameSettings::default());
    let mut group = c.benchmark_group("decode");

    for &size in PAYLOAD_SIZES {
        let frame = masked_frame(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("whole", size), &frame, |b, frame| {
            b.iter(|| {
                let mut token = ConnectionToken::new();
                processor
                    .try_read_message(&mut token, black_box(frame))
                    .expect("valid frame")
            });
        });

        group.bench_with_input(BenchmarkId::new("chunked", size), &frame, |b, frame| {
            b.iter(|| {
                let mut token = ConnectionToken::new();
                let mut messages = 0;
                for chunk in frame.chunks(READ_CHUNK) {
                    messages += processor
                        .try_read_message(&mut token, black_box(chunk))
                        .expect("valid frame")
                        .messages
                        .len();
                }
                messages
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Handshake
// ============================================================================

fn bench_handshake(c: &mut Criterion) {
    let processor = handshake_processor(HandshakeSettings::default());
    let request = b"GET /chat HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";

    c.bench_function("handshake/rfc6455", |b| {
        b.iter(|| {
            let mut token = ConnectionToken::new();
            processor.receive(&mut token, black_box(request))
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_handshake);
criterion_main!(benches);
