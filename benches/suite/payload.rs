use criterion::Criterion;
use std::hint::black_box;
use envlink::messages::Reading;
use envlink::payload::{ReadingPayloads, format_milli};

pub fn bench_format_milli(c: &mut Criterion) {
    c.bench_function("format_milli", |b| {
        b.iter(|| format_milli(black_box(-12_750)))
    });
}

pub fn bench_render_reading(c: &mut Criterion) {
    let reading = Reading {
        timestamp_ms: 1_000,
        temperature_millidegc: 23_456,
        humidity_millipercent: 55_500,
        pressure_pa: 101_325,
    };
    c.bench_function("render_reading", |b| {
        b.iter(|| ReadingPayloads::render(black_box(&reading)))
    });
}
