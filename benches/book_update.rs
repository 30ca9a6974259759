//! Order book update latency benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use market_feed::{ExchangeId, InstrumentId, MarketDataEvent, OrderBook, Price, Quantity, Side};

const INSTRUMENT: InstrumentId = InstrumentId(1);

fn update(seq: i64, side: Side, price: i64, qty: i64) -> MarketDataEvent {
    MarketDataEvent::update(
        ExchangeId(1),
        INSTRUMENT,
        seq,
        seq,
        side,
        Price::from_ticks(price),
        Quantity::from_ticks(qty),
    )
}

fn populated_book(levels: i64) -> OrderBook {
    let mut book = OrderBook::new(INSTRUMENT);
    for i in 0..levels {
        book.apply_event(&update(i, Side::Buy, 100_00000000 - i * 1_000_000, 100 + i)).unwrap();
        book.apply_event(&update(i, Side::Sell, 100_01000000 + i * 1_000_000, 100 + i)).unwrap();
    }
    book
}

fn bench_update_existing_level(c: &mut Criterion) {
    let mut book = populated_book(100);
    let mut seq = 1_000i64;

    c.bench_function("book_update_existing_level", |b| {
        b.iter(|| {
            seq += 1;
            let price = 100_00000000 - (seq % 100) * 1_000_000;
            book.apply_event(black_box(&update(seq, Side::Buy, price, seq))).unwrap();
        });
    });
}

fn bench_insert_remove_level(c: &mut Criterion) {
    let mut book = populated_book(100);
    let mut seq = 1_000i64;

    c.bench_function("book_insert_remove_level", |b| {
        b.iter(|| {
            seq += 1;
            book.apply_event(&update(seq, Side::Sell, 99_99990000, 10)).unwrap();
            book.apply_event(&update(seq, Side::Sell, 99_99990000, 0)).unwrap();
        });
    });
}

fn bench_best_bid(c: &mut Criterion) {
    let book = populated_book(100);

    c.bench_function("book_best_bid", |b| {
        b.iter(|| black_box(book.best_bid()));
    });
}

fn bench_mid_and_spread(c: &mut Criterion) {
    let book = populated_book(100);

    c.bench_function("book_mid_spread", |b| {
        b.iter(|| black_box((book.mid_price(), book.spread())));
    });
}

fn bench_imbalance(c: &mut Criterion) {
    let book = populated_book(100);

    c.bench_function("book_imbalance_10", |b| {
        b.iter(|| black_box(book.order_flow_imbalance(10)));
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let book = populated_book(100);

    c.bench_function("book_snapshot_10", |b| {
        b.iter(|| black_box(book.snapshot(10)));
    });
}

criterion_group!(
    benches,
    bench_update_existing_level,
    bench_insert_remove_level,
    bench_best_bid,
    bench_mid_and_spread,
    bench_imbalance,
    bench_snapshot
);
criterion_main!(benches);
