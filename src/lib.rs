//! Market Feed - Order Book Ingestion Core
//!
//! Moves normalized exchange market-data events from network adapters into
//! per-instrument order books with bounded latency. Features include:
//! - Integer-tick fixed-point prices and quantities
//! - Lock-free SPSC ring buffer (plus a mutex-serialized MPSC variant)
//! - Price-level order books with depth, spread and imbalance queries
//! - Per-stream sequence gap detection
//! - Fan-out to isolated consumers with atomic per-stream statistics
//!
//! ```text
//! adapter ──try_write──▶ ring buffer ──try_read──▶ Distributor ──post──▶ consumers
//!                                                     │                    │
//!                                              gaps + stats          OrderBook
//! ```

pub mod fixed_point;
pub mod event;
pub mod ring_buffer;
pub mod book_side;
pub mod order_book;
pub mod gap_detector;
pub mod stats;
pub mod consumer;
pub mod distributor;
pub mod config;

pub use fixed_point::{FixedPoint, Price, Quantity, Scale, TICKS_PER_UNIT};
pub use event::{EventKind, ExchangeId, InstrumentId, MarketDataEvent, Side, StreamKey};
pub use ring_buffer::{mpsc, spsc, RingBufferError, RingReader, RingWriter, SharedRingWriter};
pub use book_side::{BookSide, PriceLevel};
pub use order_book::{BookError, BookSnapshot, BookState, OrderBook, TradePolicy};
pub use gap_detector::{GapDetector, SequenceGap};
pub use stats::{StatsRegistry, StatsSnapshot, StreamStats};
pub use consumer::{BookConsumer, ChannelConsumer, Consumer, ConsumerError, SnapshotHandle};
pub use distributor::{ConsumerId, ConsumerStats, DispatchReport, Distributor, InstrumentFilter, RunSummary};
pub use config::{ConfigError, PipelineConfig, ShutdownPolicy};
