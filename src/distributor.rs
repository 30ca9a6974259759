//! Sequence-checked fan-out of one event stream to many consumers
//!
//! The distributor is single-threaded per source. For each event it updates
//! the stream's statistics, checks sequence continuity, then calls `post` on
//! every consumer whose filter matches, in registration order. A consumer
//! that errors or panics is logged and counted; the others still receive the
//! event and the loop keeps going.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use crossbeam::utils::Backoff;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, PipelineConfig, ShutdownPolicy};
use crate::consumer::Consumer;
use crate::event::{InstrumentId, MarketDataEvent, StreamKey};
use crate::gap_detector::{GapDetector, SequenceGap};
use crate::ring_buffer::RingReader;
use crate::stats::{now_us, StatsRegistry, StreamStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

/// Which instruments a consumer wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrumentFilter {
    All,
    Only(InstrumentId),
    Set(HashSet<InstrumentId>),
}

impl InstrumentFilter {
    #[inline]
    pub fn matches(&self, instrument: InstrumentId) -> bool {
        match self {
            InstrumentFilter::All => true,
            InstrumentFilter::Only(id) => *id == instrument,
            InstrumentFilter::Set(ids) => ids.contains(&instrument),
        }
    }
}

impl FromIterator<InstrumentId> for InstrumentFilter {
    fn from_iter<I: IntoIterator<Item = InstrumentId>>(iter: I) -> Self {
        InstrumentFilter::Set(iter.into_iter().collect())
    }
}

/// Delivery counters for one registered consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub delivered: u64,
    pub failures: u64,
    pub panics: u64,
}

struct Registration {
    id: ConsumerId,
    filter: InstrumentFilter,
    consumer: Box<dyn Consumer>,
    stats: ConsumerStats,
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    pub gap: Option<SequenceGap>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dispatched: u64,
    pub discarded: usize,
}

pub struct Distributor {
    consumers: Vec<Registration>,
    next_id: u64,
    gaps: GapDetector,
    stats: StatsRegistry,
    /// Per-stream counters cached so dispatch never touches the registry lock.
    stream_stats: HashMap<StreamKey, Arc<StreamStats>>,
    alert_tx: Sender<SequenceGap>,
    alert_rx: Receiver<SequenceGap>,
    alerts_dropped: u64,
    dispatched: u64,
}

impl Distributor {
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::with_alert_capacity(config.gap_alert_capacity)
    }

    /// A zero-capacity alert channel could never hold an alert, so it is rejected.
    pub fn with_alert_capacity(alert_capacity: usize) -> Result<Self, ConfigError> {
        if alert_capacity == 0 {
            return Err(ConfigError::GapAlertCapacity);
        }
        let (alert_tx, alert_rx) = channel::bounded(alert_capacity);
        info!(alert_capacity, "Distributor initialized");

        Ok(Distributor {
            consumers: Vec::new(),
            next_id: 0,
            gaps: GapDetector::new(),
            stats: StatsRegistry::new(),
            stream_stats: HashMap::new(),
            alert_tx,
            alert_rx,
            alerts_dropped: 0,
            dispatched: 0,
        })
    }

    pub fn register<C: Consumer + 'static>(&mut self, consumer: C, filter: InstrumentFilter) -> ConsumerId {
        self.register_boxed(Box::new(consumer), filter)
    }

    pub fn register_boxed(&mut self, consumer: Box<dyn Consumer>, filter: InstrumentFilter) -> ConsumerId {
        let id = ConsumerId(self.next_id);
        self.next_id += 1;

        info!(consumer = consumer.name(), id = id.0, ?filter, "Consumer registered");
        self.consumers.push(Registration {
            id,
            filter,
            consumer,
            stats: ConsumerStats::default(),
        });
        id
    }

    /// Remove a consumer. Returns false if `id` is not registered.
    pub fn unregister(&mut self, id: ConsumerId) -> bool {
        match self.consumers.iter().position(|reg| reg.id == id) {
            Some(index) => {
                let reg = self.consumers.remove(index);
                info!(
                    consumer = reg.consumer.name(),
                    id = id.0,
                    delivered = reg.stats.delivered,
                    failures = reg.stats.failures,
                    "Consumer unregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Deliver `event` to every matching consumer.
    pub fn dispatch(&mut self, event: &MarketDataEvent) -> DispatchReport {
        let stream = event.stream();
        let registry = &self.stats;
        let stats = self
            .stream_stats
            .entry(stream)
            .or_insert_with(|| registry.stream(stream));
        stats.record_message(now_us().saturating_sub(event.timestamp_us));

        let gap = self.gaps.process(stream, event.sequence);
        if let Some(gap) = gap {
            stats.record_gap(gap.missing());
            warn!(
                %stream,
                expected = gap.expected,
                received = gap.received,
                missing = gap.missing(),
                "Sequence gap detected"
            );
            if let Err(TrySendError::Full(_)) = self.alert_tx.try_send(gap) {
                self.alerts_dropped += 1;
                debug!(%stream, "Gap alert channel full, alert dropped");
            }
        }

        let mut report = DispatchReport {
            gap,
            ..DispatchReport::default()
        };

        for reg in self
            .consumers
            .iter_mut()
            .filter(|reg| reg.filter.matches(event.instrument_id))
        {
            let consumer = &mut reg.consumer;
            match panic::catch_unwind(AssertUnwindSafe(|| consumer.post(event))) {
                Ok(Ok(())) => {
                    reg.stats.delivered += 1;
                    report.delivered += 1;
                }
                Ok(Err(err)) => {
                    reg.stats.failures += 1;
                    report.failed += 1;
                    warn!(
                        consumer = reg.consumer.name(),
                        %stream,
                        sequence = event.sequence,
                        error = %err,
                        "Consumer rejected event"
                    );
                }
                Err(payload) => {
                    reg.stats.failures += 1;
                    reg.stats.panics += 1;
                    report.failed += 1;
                    error!(
                        consumer = reg.consumer.name(),
                        %stream,
                        sequence = event.sequence,
                        panic = panic_message(payload.as_ref()),
                        "Consumer panicked"
                    );
                }
            }
        }

        self.dispatched += 1;
        report
    }

    /// Dispatch up to `max` events already waiting in `source`. Never waits.
    pub fn pump(&mut self, source: &mut RingReader<MarketDataEvent>, max: usize) -> usize {
        let mut count = 0;
        while count < max {
            match source.try_read() {
                Some(event) => {
                    self.dispatch(&event);
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Dispatch from `source` until `stop` is raised or every writer is gone.
    ///
    /// `stop` is checked between events, never during one. Whatever is still
    /// buffered at that point is drained or discarded per `shutdown`.
    pub fn run(
        &mut self,
        source: &mut RingReader<MarketDataEvent>,
        stop: &AtomicBool,
        shutdown: ShutdownPolicy,
    ) -> RunSummary {
        let backoff = Backoff::new();
        let mut summary = RunSummary::default();

        info!(capacity = source.capacity(), "Ingest loop started");
        while !stop.load(Ordering::Acquire) {
            match source.try_read() {
                Some(event) => {
                    self.dispatch(&event);
                    summary.dispatched += 1;
                    backoff.reset();
                }
                None if source.is_disconnected() => {
                    // writers are gone; whatever they left is still part of the stream
                    while let Some(event) = source.try_read() {
                        self.dispatch(&event);
                        summary.dispatched += 1;
                    }
                    break;
                }
                None => backoff.snooze(),
            }
        }

        match shutdown {
            ShutdownPolicy::Drain => {
                while let Some(event) = source.try_read() {
                    self.dispatch(&event);
                    summary.dispatched += 1;
                }
            }
            ShutdownPolicy::Discard => {
                summary.discarded = source.discard();
                if summary.discarded > 0 {
                    warn!(discarded = summary.discarded, "Discarded buffered events on shutdown");
                }
            }
        }

        info!(
            dispatched = summary.dispatched,
            discarded = summary.discarded,
            "Ingest loop stopped"
        );
        summary
    }

    /// Receiver for gap alerts. Alerts are dropped, not queued, once the
    /// channel is full.
    pub fn gap_alerts(&self) -> Receiver<SequenceGap> {
        self.alert_rx.clone()
    }

    pub fn alerts_dropped(&self) -> u64 {
        self.alerts_dropped
    }

    /// Shared statistics registry for monitoring code.
    pub fn stats(&self) -> StatsRegistry {
        self.stats.clone()
    }

    pub fn gap_detector(&self) -> &GapDetector {
        &self.gaps
    }

    /// Forget the cursor for `stream`, typically after the adapter
    /// resubscribed and the exchange restarted its numbering.
    pub fn reset_stream(&mut self, stream: StreamKey) {
        debug!(%stream, "Sequence cursor reset");
        self.gaps.reset_stream(stream);
    }

    pub fn consumer_stats(&self, id: ConsumerId) -> Option<ConsumerStats> {
        self.consumers
            .iter()
            .find(|reg| reg.id == id)
            .map(|reg| reg.stats)
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
