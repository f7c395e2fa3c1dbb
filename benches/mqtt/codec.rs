use std::hint::black_box;

use criterion::{Criterion, Throughput};
use esp_sensors::network::application::mqtt::QoS;
use esp_sensors::network::application::mqtt::codec::{decode_fixed_header, encode_publish};

pub fn bench_encode_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_publish");
    for size in [16usize, 256, 2_000] {
        let payload = vec![0x5A; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{size}B"), |b| {
            b.iter(|| {
                encode_publish(
                    black_box("/homecontrol/device/data/bench/data"),
                    black_box(&payload),
                    false,
                    QoS::AtLeastOnce,
                    Some(7),
                )
                .expect("Failed to encode")
            })
        });
    }
    group.finish();
}

pub fn bench_decode_fixed_header(c: &mut Criterion) {
    let packet = encode_publish("bench", &[0u8; 2_000], false, QoS::AtMostOnce, None)
        .expect("Failed to encode");
    c.bench_function("decode_fixed_header", |b| {
        b.iter(|| decode_fixed_header(black_box(&packet)).expect("Failed to decode"))
    });
}
