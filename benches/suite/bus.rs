use criterion::{Criterion, Throughput};
use envlink::bus::{Bus, ChannelId};
use envlink::messages::Reading;
use std::time::Duration;

pub fn bench_publish_and_wait(c: &mut Criterion) {
    let bus = Bus::new();
    let subscriber = bus.subscribe(&ChannelId::ALL).unwrap();
    let mut timestamp_ms = 0;

    let mut group = c.benchmark_group("bus");
    group.throughput(Throughput::Elements(1));
    group.bench_function("publish_and_wait", |b| {
        b.iter(|| {
            timestamp_ms += 1;
            bus.publish(Reading {
                timestamp_ms,
                ..Reading::default()
            })
            .unwrap();
            subscriber.wait(Duration::from_millis(10)).unwrap()
        })
    });
    group.finish();
}
