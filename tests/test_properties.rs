//! Property tests for book ordering, level removal and ring buffer FIFO

use market_feed::{
    spsc, BookSide, ExchangeId, GapDetector, InstrumentId, MarketDataEvent, OrderBook, Price,
    Quantity, Side, StreamKey,
};
use proptest::prelude::*;

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

proptest! {
    #[test]
    fn prop_book_side_is_sorted(
        side in side_strategy(),
        updates in prop::collection::vec((1i64..500, -5i64..50), 0..200),
        k in 0usize..50,
    ) {
        let mut book_side = BookSide::new(side);
        for (i, (price, qty)) in updates.iter().enumerate() {
            book_side.update_level(Price::from_ticks(*price), Quantity::from_ticks(*qty), i as i64, 0);
        }

        let top = book_side.top_n(k);
        for pair in top.windows(2) {
            match side {
                Side::Sell => prop_assert!(pair[0].price <= pair[1].price),
                Side::Buy => prop_assert!(pair[0].price >= pair[1].price),
            }
        }
        prop_assert!(book_side.iter().all(|level| level.quantity.is_positive()));
    }

    #[test]
    fn prop_zero_update_is_idempotent(price in 1i64..1_000, qty in 1i64..1_000) {
        let p = Price::from_ticks(price);
        let mut book_side = BookSide::new(Side::Buy);

        book_side.update_level(p, Quantity::ZERO, 1, 0);
        prop_assert!(book_side.is_empty());

        book_side.update_level(p, Quantity::from_ticks(qty), 2, 0);
        book_side.update_level(p, Quantity::ZERO, 3, 0);
        prop_assert!(book_side.level(p).is_none());

        book_side.update_level(p, Quantity::ZERO, 4, 0);
        prop_assert!(book_side.is_empty());
    }

    #[test]
    fn prop_depth_matches_top_levels(
        updates in prop::collection::vec((side_strategy(), 1i64..200, 0i64..100), 0..100),
        n in 0usize..20,
    ) {
        let instrument = InstrumentId(1);
        let mut book = OrderBook::new(instrument);
        for (seq, (side, price, qty)) in updates.into_iter().enumerate() {
            let event = MarketDataEvent::update(
                ExchangeId(1),
                instrument,
                seq as i64,
                0,
                side,
                Price::from_ticks(price),
                Quantity::from_ticks(qty),
            );
            book.apply_event(&event).unwrap();
        }

        for side in [Side::Buy, Side::Sell] {
            let summed: Quantity = book.top_levels(side, n).iter().map(|l| l.quantity).sum();
            prop_assert_eq!(book.depth(side, n), summed);
        }

        let imbalance = book.order_flow_imbalance(n);
        prop_assert!(imbalance >= rust_decimal::Decimal::NEGATIVE_ONE);
        prop_assert!(imbalance <= rust_decimal::Decimal::ONE);
    }

    #[test]
    fn prop_ring_buffer_fifo(values in prop::collection::vec(any::<u64>(), 0..300)) {
        let (mut tx, mut rx) = spsc::<u64>(16).unwrap();
        let mut out = Vec::with_capacity(values.len());
        for v in &values {
            prop_assert!(tx.try_write(*v));
            out.push(rx.try_read().unwrap());
        }
        prop_assert_eq!(out, values);
    }

    #[test]
    fn prop_contiguous_sequences_have_no_gaps(start in -1_000i64..1_000, len in 1usize..500) {
        let stream = StreamKey::new(ExchangeId(1), InstrumentId(1));
        let mut detector = GapDetector::new();
        for seq in start..start + len as i64 {
            prop_assert!(detector.process(stream, seq).is_none());
        }
    }
}
