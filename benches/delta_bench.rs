use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dsync::transfer::packet::ContentType;
use dsync::transfer::{Fingerprint, Packet};
use dsync::{sync_local, Request, TransferOptions};
use std::fs;
use tempfile::TempDir;

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in [512usize, 2048, 65536].iter() {
        let block = vec![0x5au8; *size];
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| Fingerprint::of(black_box(&block)));
        });
    }
    group.finish();
}

fn bench_packet_codec(c: &mut Criterion) {
    let packet = Packet {
        id: 42,
        end_of_group: true,
        content_type: ContentType::Delta,
        content: Bytes::from(vec![7u8; 500]),
    };

    c.bench_function("packet_encode", |b| b.iter(|| black_box(&packet).encode().unwrap()));

    let wire = packet.encode().unwrap();
    c.bench_function("packet_decode", |b| {
        b.iter(|| Packet::decode(black_box(wire.clone())).unwrap())
    });
}

fn bench_local_sync(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("sync_local");
    group.sample_size(10);

    for file_count in [10usize, 100].iter() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        fs::create_dir(&src).unwrap();
        for i in 0..*file_count {
            fs::write(src.join(format!("file{}.bin", i)), vec![(i % 256) as u8; 16 * 1024]).unwrap();
        }
        // Prime the destination so iterations measure the unchanged path
        rt.block_on(sync_local(Request::local(&src, &dst), &TransferOptions::default()))
            .unwrap();

        group.bench_with_input(
            BenchmarkId::new("unchanged", file_count),
            file_count,
            |b, _| {
                b.iter(|| {
                    rt.block_on(sync_local(
                        Request::local(&src, &dst),
                        &TransferOptions::default(),
                    ))
                    .unwrap()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_packet_codec, bench_local_sync);
criterion_main!(benches);
