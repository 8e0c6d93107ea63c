use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ws_av_player::protocol::{EncodedFrame, FrameReassembler, FrameType, FrameWriter, FramingMode};

fn stream_messages() -> Vec<bytes::Bytes> {
    let writer = FrameWriter::default();
    (0..100u64)
        .flat_map(|i| {
            let video = EncodedFrame::new(FrameType::H264, i % 25 == 0, i * 40, vec![0x41; 12_000]);
            let audio = EncodedFrame::new(FrameType::Pcma, false, i * 40, vec![0xD5; 320]);
            writer
                .messages(&video)
                .chain(writer.messages(&audio))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn bench_reassembly(c: &mut Criterion) {
    let messages = stream_messages();
    let bytes: usize = messages.iter().map(|m| m.len()).sum();

    let mut group = c.benchmark_group("reassembler");
    group.throughput(Throughput::Bytes(bytes as u64));

    group.bench_function("message_aligned_4s_stream", |b| {
        b.iter(|| {
            let mut reassembler = FrameReassembler::new(FramingMode::MessageAligned);
            let mut out = Vec::with_capacity(200);
            for message in &messages {
                let _ = reassembler.feed(black_box(message), &mut out);
            }
            out.len()
        })
    });

    let contiguous: Vec<u8> = messages.iter().flat_map(|m| m.iter().copied()).collect();
    group.bench_function("byte_stream_4k_reads", |b| {
        b.iter(|| {
            let mut reassembler = FrameReassembler::new(FramingMode::ByteStream);
            let mut out = Vec::with_capacity(200);
            for chunk in contiguous.chunks(4096) {
                let _ = reassembler.feed(black_box(chunk), &mut out);
            }
            out.len()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_reassembly);
criterion_main!(benches);
