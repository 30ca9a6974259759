//! Price levels for one side of a book
//!
//! A `BookSide` keeps its levels in a `BTreeMap` keyed by price. Bids iterate
//! the map in reverse so that, for either side, the first level yielded is
//! always the best price.

use std::collections::btree_map::{self, BTreeMap};
use std::iter::Rev;

use serde::{Deserialize, Serialize};

use crate::event::Side;
use crate::fixed_point::{Price, Quantity};

/// Aggregate resting quantity at one price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub quantity: Quantity,
    /// Sequence of the event that last touched this level.
    pub sequence: i64,
    pub timestamp_us: i64,
    /// Coarse L3 approximation, when the venue publishes it.
    pub order_count: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        BookSide {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Set the absolute quantity at `price`.
    ///
    /// A quantity of zero or less removes the level (no-op if absent).
    /// Otherwise the level is created if needed and overwritten: the last
    /// call wins regardless of timestamps.
    pub fn update_level(&mut self, price: Price, quantity: Quantity, sequence: i64, timestamp_us: i64) {
        self.update_level_with_count(price, quantity, sequence, timestamp_us, None);
    }

    pub fn update_level_with_count(
        &mut self,
        price: Price,
        quantity: Quantity,
        sequence: i64,
        timestamp_us: i64,
        order_count: Option<u32>,
    ) {
        if !quantity.is_positive() {
            self.levels.remove(&price);
            return;
        }

        let level = self.levels.entry(price).or_insert(PriceLevel {
            price,
            quantity,
            sequence,
            timestamp_us,
            order_count,
        });
        level.quantity = quantity;
        level.sequence = sequence;
        level.timestamp_us = timestamp_us;
        level.order_count = order_count;
    }

    /// Subtract `quantity` at `price`, removing the level once it reaches zero.
    /// Returns the quantity left resting, or `None` if no level exists.
    pub fn reduce_level(
        &mut self,
        price: Price,
        quantity: Quantity,
        sequence: i64,
        timestamp_us: i64,
    ) -> Option<Quantity> {
        let level = self.levels.get_mut(&price)?;
        let remaining = level.quantity.saturating_sub(quantity);
        if !remaining.is_positive() {
            self.levels.remove(&price);
            return Some(Quantity::ZERO);
        }

        level.quantity = remaining;
        level.sequence = sequence;
        level.timestamp_us = timestamp_us;
        Some(remaining)
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Levels in priority order, best first.
    pub fn iter(&self) -> Levels<'_> {
        match self.side {
            Side::Buy => Levels::Descending(self.levels.values().rev()),
            Side::Sell => Levels::Ascending(self.levels.values()),
        }
    }

    pub fn best_level(&self) -> Option<&PriceLevel> {
        match self.side {
            Side::Buy => self.levels.values().next_back(),
            Side::Sell => self.levels.values().next(),
        }
    }

    /// The `index`-th best level (0 = best).
    pub fn level_at(&self, index: usize) -> Option<&PriceLevel> {
        self.iter().nth(index)
    }

    pub fn level(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    pub fn top_n(&self, n: usize) -> Vec<PriceLevel> {
        self.iter().take(n).copied().collect()
    }

    /// Total quantity over the best `n` levels, saturating at `Quantity::MAX`.
    pub fn depth(&self, n: usize) -> Quantity {
        saturate(self.depth_ticks(n))
    }

    /// Exact tick total over the best `n` levels.
    pub fn depth_ticks(&self, n: usize) -> i128 {
        sum_ticks(self.iter().take(n))
    }

    /// Total quantity resting at `price` or better, saturating at
    /// `Quantity::MAX`. Stops at the first level past `price`, so cost is
    /// proportional to the levels that qualify.
    pub fn quantity_at_or_better(&self, price: Price) -> Quantity {
        let side = self.side;
        saturate(sum_ticks(
            self.iter().take_while(|level| side.is_at_or_better(level.price, price)),
        ))
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

// Quantities are i64 ticks, so an i128 accumulator cannot overflow for any
// realistic level count.
fn sum_ticks<'a>(levels: impl Iterator<Item = &'a PriceLevel>) -> i128 {
    levels.map(|level| i128::from(level.quantity.to_ticks())).sum()
}

fn saturate(ticks: i128) -> Quantity {
    Quantity::from_ticks(i64::try_from(ticks).unwrap_or(if ticks < 0 { i64::MIN } else { i64::MAX }))
}

/// Best-first iterator over a side's levels.
pub enum Levels<'a> {
    Ascending(btree_map::Values<'a, Price, PriceLevel>),
    Descending(Rev<btree_map::Values<'a, Price, PriceLevel>>),
}

impl<'a> Iterator for Levels<'a> {
    type Item = &'a PriceLevel;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Levels::Ascending(it) => it.next(),
            Levels::Descending(it) => it.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Levels::Ascending(it) => it.size_hint(),
            Levels::Descending(it) => it.size_hint(),
        }
    }
}

impl<'a> IntoIterator for &'a BookSide {
    type Item = &'a PriceLevel;
    type IntoIter = Levels<'a>;

    fn into_iter(self) -> Levels<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(ticks: i64) -> Price {
        Price::from_ticks(ticks)
    }

    fn q(ticks: i64) -> Quantity {
        Quantity::from_ticks(ticks)
    }

    fn filled(side: Side) -> BookSide {
        let mut book_side = BookSide::new(side);
        for (i, price) in [100, 103, 101, 104, 102].into_iter().enumerate() {
            book_side.update_level(p(price), q(10 * (i as i64 + 1)), i as i64, 0);
        }
        book_side
    }

    #[test]
    fn test_bid_ordering() {
        let bids = filled(Side::Buy);
        let prices: Vec<i64> = bids.iter().map(|l| l.price.to_ticks()).collect();
        assert_eq!(prices, vec![104, 103, 102, 101, 100]);
        assert_eq!(bids.best_level().unwrap().price, p(104));
    }

    #[test]
    fn test_ask_ordering() {
        let asks = filled(Side::Sell);
        let prices: Vec<i64> = asks.top_n(3).iter().map(|l| l.price.to_ticks()).collect();
        assert_eq!(prices, vec![100, 101, 102]);
        assert_eq!(asks.level_at(4).unwrap().price, p(104));
        assert!(asks.level_at(5).is_none());
    }

    #[test]
    fn test_overwrite_is_last_write_wins() {
        let mut bids = BookSide::new(Side::Buy);
        bids.update_level(p(100), q(5), 2, 2_000);
        bids.update_level(p(100), q(7), 1, 1_000);

        let level = bids.level(p(100)).unwrap();
        assert_eq!(level.quantity, q(7));
        assert_eq!(level.sequence, 1);
        assert_eq!(level.timestamp_us, 1_000);
        assert_eq!(bids.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut asks = BookSide::new(Side::Sell);
        asks.update_level(p(100), q(0), 1, 0);
        assert!(asks.is_empty());

        asks.update_level(p(100), q(5), 2, 0);
        asks.update_level(p(100), q(0), 3, 0);
        assert!(asks.is_empty());

        asks.update_level(p(100), q(-1), 4, 0);
        assert!(asks.is_empty());
    }

    #[test]
    fn test_depth_and_at_or_better() {
        // bids: 104=40, 103=20, 102=50, 101=30, 100=10
        let bids = filled(Side::Buy);
        assert_eq!(bids.depth(2), q(60));
        assert_eq!(bids.depth(100), q(150));
        assert_eq!(bids.quantity_at_or_better(p(102)), q(110));
        assert_eq!(bids.quantity_at_or_better(p(105)), Quantity::ZERO);

        // asks: 100=10, 101=30, 102=50, 103=20, 104=40
        let asks = filled(Side::Sell);
        assert_eq!(asks.quantity_at_or_better(p(101)), q(40));
        assert_eq!(asks.quantity_at_or_better(p(99)), Quantity::ZERO);
    }

    #[test]
    fn test_depth_saturates_near_tick_limit() {
        let mut bids = BookSide::new(Side::Buy);
        bids.update_level(p(100), q(6_000_000_000_000_000_000), 1, 0);
        bids.update_level(p(99), q(6_000_000_000_000_000_000), 2, 0);

        assert_eq!(bids.depth_ticks(5), 12_000_000_000_000_000_000);
        assert_eq!(bids.depth(5), Quantity::MAX);
        assert_eq!(bids.quantity_at_or_better(p(99)), Quantity::MAX);
        assert_eq!(bids.depth(1), q(6_000_000_000_000_000_000));
    }

    #[test]
    fn test_reduce_level() {
        let mut asks = BookSide::new(Side::Sell);
        asks.update_level(p(100), q(10), 1, 0);

        assert_eq!(asks.reduce_level(p(100), q(4), 2, 0), Some(q(6)));
        assert_eq!(asks.reduce_level(p(100), q(10), 3, 0), Some(Quantity::ZERO));
        assert!(asks.level(p(100)).is_none());
        assert_eq!(asks.reduce_level(p(100), q(1), 4, 0), None);
    }

    #[test]
    fn test_order_count() {
        let mut bids = BookSide::new(Side::Buy);
        bids.update_level_with_count(p(100), q(10), 1, 0, Some(3));
        assert_eq!(bids.best_level().unwrap().order_count, Some(3));
        bids.update_level(p(100), q(10), 2, 0);
        assert_eq!(bids.best_level().unwrap().order_count, None);
    }
}
