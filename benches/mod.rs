use criterion::{criterion_group, criterion_main};

mod mqtt;

criterion_group!(
    benches,
    mqtt::codec::bench_encode_publish,
    mqtt::codec::bench_decode_fixed_header,
    mqtt::session::bench_publish,
    mqtt::session::bench_poll,
    mqtt::session::bench_publish_and_poll_qos1,
    mqtt::session::bench_read_topic
);
criterion_main!(benches);
