//! Ring buffer write/read latency benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use market_feed::{mpsc, spsc, ExchangeId, InstrumentId, MarketDataEvent, Price, Quantity, Side};

fn sample_event(seq: i64) -> MarketDataEvent {
    MarketDataEvent::update(
        ExchangeId(1),
        InstrumentId(1),
        seq,
        seq,
        Side::Buy,
        Price::from_ticks(100_00000000),
        Quantity::from_ticks(1_00000000),
    )
}

fn bench_spsc_round_trip(c: &mut Criterion) {
    let (mut tx, mut rx) = spsc(1024).unwrap();
    let mut seq = 0i64;

    c.bench_function("spsc_write_read", |b| {
        b.iter(|| {
            seq += 1;
            tx.try_write(black_box(sample_event(seq)));
            black_box(rx.try_read())
        });
    });
}

fn bench_spsc_batch(c: &mut Criterion) {
    let (mut tx, mut rx) = spsc(1024).unwrap();

    c.bench_function("spsc_batch_512", |b| {
        b.iter(|| {
            for seq in 0..512 {
                tx.try_write(sample_event(seq));
            }
            let mut drained = 0;
            while rx.try_read().is_some() {
                drained += 1;
            }
            black_box(drained)
        });
    });
}

fn bench_mpsc_round_trip(c: &mut Criterion) {
    let (tx, mut rx) = mpsc(1024).unwrap();
    let mut seq = 0i64;

    c.bench_function("mpsc_write_read", |b| {
        b.iter(|| {
            seq += 1;
            tx.try_write(black_box(sample_event(seq)));
            black_box(rx.try_read())
        });
    });
}

criterion_group!(
    benches,
    bench_spsc_round_trip,
    bench_spsc_batch,
    bench_mpsc_round_trip
);
criterion_main!(benches);
