use envlink::messages::Reading;
use envlink::payload::{ReadingPayloads, TOPIC_HUMIDITY, TOPIC_PRESSURE, TOPIC_TEMPERATURE, format_milli};
use rand::Rng;

/// Reads a rendered payload back into thousandths.
fn parse_milli(payload: &str) -> i64 {
    let (int, frac) = payload.split_once('.').unwrap();
    assert_eq!(frac.len(), 3, "{}", payload);
    let negative = int.starts_with('-');
    let magnitude = int.trim_start_matches('-').parse::<i64>().unwrap() * 1000
        + frac.parse::<i64>().unwrap();
    if negative { -magnitude } else { magnitude }
}

#[test]
fn test_known_values() {
    assert_eq!(format_milli(0).as_str(), "0.000");
    assert_eq!(format_milli(7).as_str(), "0.007");
    assert_eq!(format_milli(1_000).as_str(), "1.000");
    assert_eq!(format_milli(-5).as_str(), "-0.005");
    assert_eq!(format_milli(-12_750).as_str(), "-12.750");
    assert_eq!(format_milli(101_325).as_str(), "101.325");
}

#[test]
fn test_random_values_parse_back() {
    let mut rng = rand::thread_rng();
    for _ in 0..1_000 {
        let value = rng.gen_range(-1_000_000_000i64..1_000_000_000);
        assert_eq!(parse_milli(&format_milli(value)), value);
    }
}

#[test]
fn test_reading_payloads() {
    let reading = Reading {
        timestamp_ms: 1,
        temperature_millidegc: 23_456,
        humidity_millipercent: 55_500,
        pressure_pa: 101_325,
    };
    let payloads = ReadingPayloads::render(&reading);
    assert_eq!(
        payloads.topics(),
        [
            (TOPIC_TEMPERATURE, "23.456"),
            (TOPIC_HUMIDITY, "55.500"),
            (TOPIC_PRESSURE, "101.325"),
        ]
    );
    assert_eq!(TOPIC_TEMPERATURE, "sensors/temperature");
    assert_eq!(TOPIC_HUMIDITY, "sensors/humidity");
    assert_eq!(TOPIC_PRESSURE, "sensors/pressure");
}
