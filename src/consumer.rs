//! Downstream consumers of the distributed event stream
//!
//! A consumer exposes one non-blocking `post`. `BookConsumer` drives an
//! `OrderBook` in place and periodically publishes snapshots for readers on
//! other threads. `ChannelConsumer` hands events to a dedicated thread over a
//! bounded channel.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use thiserror::Error;

use crate::event::{InstrumentId, MarketDataEvent};
use crate::order_book::{BookError, BookSnapshot, OrderBook, TradePolicy};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    #[error(transparent)]
    Book(#[from] BookError),

    #[error("consumer queue full ({capacity} events)")]
    Backpressure { capacity: usize },

    #[error("consumer disconnected")]
    Disconnected,

    #[error("{0}")]
    Other(String),
}

pub trait Consumer: Send {
    fn name(&self) -> &str;

    /// Accept one event. Must not block.
    fn post(&mut self, event: &MarketDataEvent) -> Result<(), ConsumerError>;
}

/// Latest published snapshot of a book, readable from any thread.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    latest: Arc<RwLock<Arc<BookSnapshot>>>,
}

impl SnapshotHandle {
    fn new(initial: BookSnapshot) -> Self {
        SnapshotHandle {
            latest: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    pub fn load(&self) -> Arc<BookSnapshot> {
        Arc::clone(&self.latest.read())
    }

    fn store(&self, snapshot: BookSnapshot) {
        *self.latest.write() = Arc::new(snapshot);
    }
}

/// Owns one order book and applies every event posted to it.
pub struct BookConsumer {
    name: String,
    book: OrderBook,
    snapshot_depth: usize,
    snapshot_interval: u64,
    since_publish: u64,
    handle: SnapshotHandle,
}

impl BookConsumer {
    /// `snapshot_interval` is the number of applied events between published
    /// snapshots; zero disables periodic publishing.
    pub fn new(
        instrument_id: InstrumentId,
        trade_policy: TradePolicy,
        snapshot_depth: usize,
        snapshot_interval: u64,
    ) -> Self {
        let book = OrderBook::with_trade_policy(instrument_id, trade_policy);
        let handle = SnapshotHandle::new(book.snapshot(snapshot_depth));
        BookConsumer {
            name: format!("book-{}", instrument_id),
            book,
            snapshot_depth,
            snapshot_interval,
            since_publish: 0,
            handle,
        }
    }

    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.handle.clone()
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Publish a snapshot right away.
    pub fn publish(&mut self) {
        self.handle.store(self.book.snapshot(self.snapshot_depth));
        self.since_publish = 0;
    }
}

impl Consumer for BookConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&mut self, event: &MarketDataEvent) -> Result<(), ConsumerError> {
        self.book.apply_event(event)?;

        self.since_publish += 1;
        if self.snapshot_interval > 0 && self.since_publish >= self.snapshot_interval {
            self.publish();
        }
        Ok(())
    }
}

/// Forwards events to a bounded channel drained by another thread.
pub struct ChannelConsumer {
    name: String,
    capacity: usize,
    tx: Sender<MarketDataEvent>,
}

impl ChannelConsumer {
    pub fn bounded(name: impl Into<String>, capacity: usize) -> (Self, Receiver<MarketDataEvent>) {
        let (tx, rx) = channel::bounded(capacity);
        (
            ChannelConsumer {
                name: name.into(),
                capacity,
                tx,
            },
            rx,
        )
    }
}

impl Consumer for ChannelConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&mut self, event: &MarketDataEvent) -> Result<(), ConsumerError> {
        self.tx.try_send(*event).map_err(|err| match err {
            TrySendError::Full(_) => ConsumerError::Backpressure {
                capacity: self.capacity,
            },
            TrySendError::Disconnected(_) => ConsumerError::Disconnected,
        })
    }
}
