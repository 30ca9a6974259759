//! Per-instrument order book built from normalized events
//!
//! Owns one `BookSide` per side and applies `MarketDataEvent`s in call order.
//! The book is mutated by exactly one thread; other threads read it through
//! `snapshot`, which copies the top levels into an owned `BookSnapshot`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::book_side::{BookSide, PriceLevel};
use crate::event::{EventKind, InstrumentId, MarketDataEvent, Side};
use crate::fixed_point::{Price, Quantity};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookError {
    #[error("event for instrument {received} delivered to book for instrument {expected}")]
    InstrumentMismatch {
        expected: InstrumentId,
        received: InstrumentId,
    },
}

/// How a `Trade` event affects resting quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradePolicy {
    /// Count the trade only; the feed's next update carries the new quantity.
    #[default]
    Informational,
    /// `event.side` is the aggressor; reduce the opposite side's level at the
    /// trade price by the traded quantity.
    DecrementResting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookState {
    Uninitialized,
    Live,
}

#[derive(Debug, Clone)]
pub struct OrderBook {
    instrument_id: InstrumentId,
    bids: BookSide,
    asks: BookSide,
    state: BookState,
    trade_policy: TradePolicy,
    last_sequence: i64,
    last_timestamp_us: i64,
    update_count: u64,
    trade_count: u64,
}

impl OrderBook {
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self::with_trade_policy(instrument_id, TradePolicy::default())
    }

    pub fn with_trade_policy(instrument_id: InstrumentId, trade_policy: TradePolicy) -> Self {
        OrderBook {
            instrument_id,
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
            state: BookState::Uninitialized,
            trade_policy,
            last_sequence: 0,
            last_timestamp_us: 0,
            update_count: 0,
            trade_count: 0,
        }
    }

    /// Apply one event.
    ///
    /// Events addressed to another instrument are logged and rejected; the
    /// book is left untouched and the caller simply moves on.
    pub fn apply_event(&mut self, event: &MarketDataEvent) -> Result<(), BookError> {
        if event.instrument_id != self.instrument_id {
            warn!(
                book = %self.instrument_id,
                instrument = %event.instrument_id,
                sequence = event.sequence,
                kind = event.kind.label(),
                "Dropping event addressed to another instrument"
            );
            return Err(BookError::InstrumentMismatch {
                expected: self.instrument_id,
                received: event.instrument_id,
            });
        }

        match event.kind {
            EventKind::Update => {
                self.side_mut(event.side).update_level_with_count(
                    event.price,
                    event.quantity,
                    event.sequence,
                    event.timestamp_us,
                    event.order_count,
                );
            }

            EventKind::Trade => {
                self.trade_count += 1;
                if self.trade_policy == TradePolicy::DecrementResting {
                    let resting = event.side.opposite();
                    let remaining = self.side_mut(resting).reduce_level(
                        event.price,
                        event.quantity,
                        event.sequence,
                        event.timestamp_us,
                    );
                    if remaining.is_none() {
                        debug!(
                            instrument = %self.instrument_id,
                            price = %event.price,
                            "Trade at price with no resting level"
                        );
                    }
                }
            }

            EventKind::Snapshot => {
                self.bids.clear();
                self.asks.clear();
                self.side_mut(event.side).update_level_with_count(
                    event.price,
                    event.quantity,
                    event.sequence,
                    event.timestamp_us,
                    event.order_count,
                );
            }
        }

        self.last_sequence = event.sequence;
        self.last_timestamp_us = event.timestamp_us;
        self.update_count += 1;
        self.state = BookState::Live;
        Ok(())
    }

    /// Replace the whole book with a full depth image.
    pub fn apply_snapshot(
        &mut self,
        sequence: i64,
        timestamp_us: i64,
        bids: &[(Price, Quantity)],
        asks: &[(Price, Quantity)],
    ) {
        self.bids.clear();
        self.asks.clear();

        for &(price, quantity) in bids {
            self.bids.update_level(price, quantity, sequence, timestamp_us);
        }
        for &(price, quantity) in asks {
            self.asks.update_level(price, quantity, sequence, timestamp_us);
        }

        self.last_sequence = sequence;
        self.last_timestamp_us = timestamp_us;
        self.update_count += 1;
        self.state = BookState::Live;
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    /// Best bid price and quantity, or `(0, 0)` when there are no bids.
    pub fn best_bid(&self) -> (Price, Quantity) {
        Self::top_of(&self.bids)
    }

    /// Best ask price and quantity, or `(0, 0)` when there are no asks.
    pub fn best_ask(&self) -> (Price, Quantity) {
        Self::top_of(&self.asks)
    }

    fn top_of(side: &BookSide) -> (Price, Quantity) {
        side.best_level()
            .map(|level| (level.price, level.quantity))
            .unwrap_or((Price::ZERO, Quantity::ZERO))
    }

    fn both_tops(&self) -> Option<(Price, Price)> {
        let bid = self.bids.best_level()?;
        let ask = self.asks.best_level()?;
        Some((bid.price, ask.price))
    }

    /// Mean of best bid and ask in ticks (floored), zero if either side is empty.
    pub fn mid_price(&self) -> Price {
        match self.both_tops() {
            Some((bid, ask)) => {
                let sum = i128::from(bid.to_ticks()) + i128::from(ask.to_ticks());
                // The floored mean of two i64 values lies between them.
                Price::from_ticks(sum.div_euclid(2) as i64)
            }
            None => Price::ZERO,
        }
    }

    /// Best ask minus best bid, zero if either side is empty. Negative when
    /// the book is crossed.
    pub fn spread(&self) -> Price {
        match self.both_tops() {
            Some((bid, ask)) => ask.saturating_sub(bid),
            None => Price::ZERO,
        }
    }

    pub fn is_crossed(&self) -> bool {
        matches!(self.both_tops(), Some((bid, ask)) if bid >= ask)
    }

    pub fn top_levels(&self, side: Side, n: usize) -> Vec<PriceLevel> {
        self.side(side).top_n(n)
    }

    pub fn depth(&self, side: Side, n: usize) -> Quantity {
        self.side(side).depth(n)
    }

    pub fn quantity_at_or_better(&self, side: Side, price: Price) -> Quantity {
        self.side(side).quantity_at_or_better(price)
    }

    /// `(bid_depth - ask_depth) / (bid_depth + ask_depth)` over the best
    /// `depth` levels, in [-1, 1]. Zero when both sides are empty.
    pub fn order_flow_imbalance(&self, depth: usize) -> Decimal {
        let bid = self.bids.depth_ticks(depth);
        let ask = self.asks.depth_ticks(depth);
        let total = bid + ask;
        if total == 0 {
            return Decimal::ZERO;
        }

        // Sums past Decimal's 96-bit mantissa need ~2^33 max-size levels; fall back to zero.
        match (Decimal::try_from_i128_with_scale(bid - ask, 0), Decimal::try_from_i128_with_scale(total, 0)) {
            (Ok(diff), Ok(total)) => diff / total,
            _ => Decimal::ZERO,
        }
    }

    /// Owned copy of the best `n` levels per side, safe to send to other threads.
    pub fn snapshot(&self, n: usize) -> BookSnapshot {
        BookSnapshot {
            instrument_id: self.instrument_id,
            sequence: self.last_sequence,
            timestamp_us: self.last_timestamp_us,
            bids: self.bids.top_n(n),
            asks: self.asks.top_n(n),
        }
    }

    pub fn instrument_id(&self) -> InstrumentId {
        self.instrument_id
    }

    pub fn state(&self) -> BookState {
        self.state
    }

    pub fn trade_policy(&self) -> TradePolicy {
        self.trade_policy
    }

    pub fn last_sequence(&self) -> i64 {
        self.last_sequence
    }

    pub fn last_timestamp_us(&self) -> i64 {
        self.last_timestamp_us
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn trade_count(&self) -> u64 {
        self.trade_count
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }
}

/// Immutable top-of-book image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub instrument_id: InstrumentId,
    pub sequence: i64,
    pub timestamp_us: i64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }
}
