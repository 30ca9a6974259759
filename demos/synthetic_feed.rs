//! Synthetic market data feed
//!
//! Generates random level updates for a few instruments on a producer thread,
//! pushes them through the ring buffer into the distributor, and prints the
//! resulting books and per-stream statistics. A small fraction of sequence
//! numbers is skipped on purpose so gap detection has something to report.
//!
//! Usage: cargo run --example synthetic_feed -- [message_count]
//! Log level follows RUST_LOG (default: info).

use std::env;
use std::sync::atomic::AtomicBool;
use std::thread;

use market_feed::stats::now_us;
use market_feed::{
    spsc, BookConsumer, Distributor, EventKind, ExchangeId, InstrumentFilter, InstrumentId,
    MarketDataEvent, PipelineConfig, Price, Quantity, Side,
};
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

const EXCHANGE: ExchangeId = ExchangeId(1);
const INSTRUMENTS: [InstrumentId; 3] = [InstrumentId(1), InstrumentId(2), InstrumentId(3)];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let message_count: usize = env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(100_000);

    let config = PipelineConfig::default();

    let (mut writer, mut reader) = spsc::<MarketDataEvent>(config.ring_capacity)?;

    let mut distributor = Distributor::new(&config)?;
    let mut views = Vec::new();
    for instrument in INSTRUMENTS {
        let consumer = BookConsumer::new(
            instrument,
            config.trade_policy,
            config.snapshot_depth,
            config.snapshot_interval,
        );
        views.push(consumer.snapshot_handle());
        distributor.register(consumer, InstrumentFilter::Only(instrument));
    }
    let stats = distributor.stats();
    let alerts = distributor.gap_alerts();

    info!(message_count, "Generating synthetic feed");

    let producer = thread::spawn(move || {
        let mut rng = rand::thread_rng();
        let mut sequences = [0i64; INSTRUMENTS.len()];
        let mut full = 0u64;

        for _ in 0..message_count {
            let slot = rng.gen_range(0..INSTRUMENTS.len());
            // skip roughly one sequence number in a thousand
            sequences[slot] += if rng.gen_ratio(1, 1_000) { 2 } else { 1 };

            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let offset = rng.gen_range(1i64..500) * 1_000_000;
            let mid = 100_00000000i64;
            let price = match side {
                Side::Buy => mid - offset,
                Side::Sell => mid + offset,
            };
            let quantity = if rng.gen_ratio(1, 5) { 0 } else { rng.gen_range(1i64..1_000) * 1_000_000 };
            let kind = if rng.gen_ratio(1, 20) { EventKind::Trade } else { EventKind::Update };

            let event = MarketDataEvent::update(
                EXCHANGE,
                INSTRUMENTS[slot],
                sequences[slot],
                now_us(),
                side,
                Price::from_ticks(price),
                Quantity::from_ticks(quantity),
            )
            .with_kind(kind);

            while !writer.try_write(event) {
                full += 1;
                std::hint::spin_loop();
            }
        }
        full
    });

    // Runs until the producer drops its writer.
    let stop = AtomicBool::new(false);
    let summary = distributor.run(&mut reader, &stop, config.shutdown_policy);
    let full_retries = producer.join().map_err(|_| "producer thread panicked")?;

    println!("=== Feed Summary ===");
    println!("Dispatched: {}", summary.dispatched);
    println!("Ring-full retries: {}", full_retries);
    println!("Gap alerts: {}", alerts.try_iter().count());

    let totals = stats.totals();
    println!("Throughput: {:.0} msgs/sec", totals.messages_per_sec());
    stats.log_summary();

    for (instrument, view) in INSTRUMENTS.iter().zip(&views) {
        let snapshot = view.load();
        println!("\nBook {} @ seq {}", instrument, snapshot.sequence);
        if let (Some(bid), Some(ask)) = (snapshot.best_bid(), snapshot.best_ask()) {
            println!("  Best bid: {} x {}", bid.price, bid.quantity);
            println!("  Best ask: {} x {}", ask.price, ask.quantity);
            println!("  Spread:   {}", ask.price - bid.price);
        }
        println!("  Levels:   {} bids / {} asks (top {})", snapshot.bids.len(), snapshot.asks.len(), config.snapshot_depth);
    }

    Ok(())
}
