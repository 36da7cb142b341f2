use criterion::{criterion_group, criterion_main};

mod suite;

criterion_group!(
    benches,
    suite::payload::bench_format_milli,
    suite::payload::bench_render_reading,
    suite::bus::bench_publish_and_wait,
    suite::session::bench_forward_reading
);
criterion_main!(benches);
