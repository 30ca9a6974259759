//! Normalized market data event
//!
//! Adapters convert exchange-specific messages into `MarketDataEvent` at the
//! ingestion boundary. The event is a small `Copy` record passed by value
//! through the ring buffer, the distributor and every consumer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fixed_point::{Price, Quantity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExchangeId(pub u16);

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One sequenced stream: an instrument as published by one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub exchange: ExchangeId,
    pub instrument: InstrumentId,
}

impl StreamKey {
    pub const fn new(exchange: ExchangeId, instrument: InstrumentId) -> Self {
        StreamKey {
            exchange,
            instrument,
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.exchange, self.instrument)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Decode an adapter side code: 0 = buy, 1 = sell.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Side::Buy),
            1 => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// True when `price` is at least as aggressive as `limit` for a resting
    /// order on this side (higher for bids, lower for asks).
    #[inline]
    pub fn is_at_or_better(self, price: Price, limit: Price) -> bool {
        match self {
            Side::Buy => price >= limit,
            Side::Sell => price <= limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Absolute resting quantity at a price level.
    Update,
    /// An execution at a price.
    Trade,
    /// Start of a fresh book image; clears both sides, then applies this
    /// event's level. Every Snapshot event clears again, so the remaining
    /// levels of a multi-level image must follow as `Update` events or be
    /// loaded in one call through `OrderBook::apply_snapshot`.
    Snapshot,
}

impl EventKind {
    /// Decode an adapter kind code: 0 = update, 1 = trade, 2 = snapshot.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(EventKind::Update),
            1 => Some(EventKind::Trade),
            2 => Some(EventKind::Snapshot),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EventKind::Update => "update",
            EventKind::Trade => "trade",
            EventKind::Snapshot => "snapshot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDataEvent {
    /// Monotonic per (exchange, instrument) stream.
    pub sequence: i64,
    /// Exchange timestamp in microseconds since the Unix epoch.
    pub timestamp_us: i64,
    pub side: Side,
    pub price: Price,
    /// Absolute resting quantity for updates, traded size for trades.
    pub quantity: Quantity,
    pub kind: EventKind,
    pub instrument_id: InstrumentId,
    pub exchange: ExchangeId,
    /// Orders resting at the level, when the venue publishes it.
    pub order_count: Option<u32>,
}

impl MarketDataEvent {
    pub fn update(
        exchange: ExchangeId,
        instrument_id: InstrumentId,
        sequence: i64,
        timestamp_us: i64,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        MarketDataEvent {
            sequence,
            timestamp_us,
            side,
            price,
            quantity,
            kind: EventKind::Update,
            instrument_id,
            exchange,
            order_count: None,
        }
    }

    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_order_count(mut self, order_count: u32) -> Self {
        self.order_count = Some(order_count);
        self
    }

    pub fn stream(&self) -> StreamKey {
        StreamKey::new(self.exchange, self.instrument_id)
    }
}
