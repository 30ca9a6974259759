//! Feed statistics tracking
//!
//! Per-stream counters (messages, gaps, end-to-end latency, reconnects) kept
//! in atomics so monitoring threads can poll them while the distributor
//! writes. The registry lock is taken only when a stream is first seen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::event::StreamKey;

/// Microseconds since the Unix epoch on the local wall clock.
pub fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[derive(Debug)]
pub struct StreamStats {
    created: Instant,
    messages: AtomicU64,
    gap_events: AtomicU64,
    missing_sequences: AtomicU64,
    latency_sum_us: AtomicU64,
    latency_samples: AtomicU64,
    max_latency_us: AtomicU64,
    reconnects: AtomicU64,
}

impl StreamStats {
    pub fn new() -> Self {
        StreamStats {
            created: Instant::now(),
            messages: AtomicU64::new(0),
            gap_events: AtomicU64::new(0),
            missing_sequences: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
            max_latency_us: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Record one message and its end-to-end latency. Negative latency
    /// (clock skew) counts as zero.
    pub fn record_message(&self, latency_us: i64) {
        let latency = latency_us.max(0) as u64;
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
        self.max_latency_us.fetch_max(latency, Ordering::Relaxed);
    }

    pub fn record_gap(&self, missing: u64) {
        self.gap_events.fetch_add(1, Ordering::Relaxed);
        self.missing_sequences.fetch_add(missing, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            gap_events: self.gap_events.load(Ordering::Relaxed),
            missing_sequences: self.missing_sequences.load(Ordering::Relaxed),
            latency_sum_us: self.latency_sum_us.load(Ordering::Relaxed),
            latency_samples: self.latency_samples.load(Ordering::Relaxed),
            max_latency_us: self.max_latency_us.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            elapsed: self.created.elapsed(),
        }
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a stream's counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub messages: u64,
    pub gap_events: u64,
    pub missing_sequences: u64,
    pub latency_sum_us: u64,
    pub latency_samples: u64,
    pub max_latency_us: u64,
    pub reconnects: u64,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    pub fn average_latency_us(&self) -> f64 {
        if self.latency_samples == 0 {
            0.0
        } else {
            self.latency_sum_us as f64 / self.latency_samples as f64
        }
    }

    pub fn messages_per_sec(&self) -> f64 {
        let elapsed = self.elapsed.as_secs_f64();
        if elapsed > 0.0 {
            self.messages as f64 / elapsed
        } else {
            0.0
        }
    }
}

/// Shared map of stream → counters, cloned into monitoring code.
#[derive(Debug, Clone, Default)]
pub struct StatsRegistry {
    streams: Arc<RwLock<HashMap<StreamKey, Arc<StreamStats>>>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for `stream`, created on first use.
    pub fn stream(&self, stream: StreamKey) -> Arc<StreamStats> {
        if let Some(stats) = self.streams.read().get(&stream) {
            return Arc::clone(stats);
        }

        let mut streams = self.streams.write();
        Arc::clone(streams.entry(stream).or_insert_with(|| {
            info!(%stream, "Tracking new stream");
            Arc::new(StreamStats::new())
        }))
    }

    pub fn get(&self, stream: StreamKey) -> Option<StatsSnapshot> {
        self.streams.read().get(&stream).map(|stats| stats.snapshot())
    }

    /// Adapters call this when they re-establish a session for `stream`.
    pub fn record_reconnect(&self, stream: StreamKey) {
        self.stream(stream).record_reconnect();
    }

    /// Snapshot of every stream, sorted by key.
    pub fn snapshot_all(&self) -> Vec<(StreamKey, StatsSnapshot)> {
        let mut all: Vec<_> = self
            .streams
            .read()
            .iter()
            .map(|(key, stats)| (*key, stats.snapshot()))
            .collect();
        all.sort_by_key(|(key, _)| *key);
        all
    }

    /// Sum across all streams.
    pub fn totals(&self) -> StatsSnapshot {
        let streams = self.streams.read();
        let mut totals = StatsSnapshot {
            messages: 0,
            gap_events: 0,
            missing_sequences: 0,
            latency_sum_us: 0,
            latency_samples: 0,
            max_latency_us: 0,
            reconnects: 0,
            elapsed: Duration::ZERO,
        };
        for stats in streams.values() {
            let s = stats.snapshot();
            totals.messages += s.messages;
            totals.gap_events += s.gap_events;
            totals.missing_sequences += s.missing_sequences;
            totals.latency_sum_us += s.latency_sum_us;
            totals.latency_samples += s.latency_samples;
            totals.max_latency_us = totals.max_latency_us.max(s.max_latency_us);
            totals.reconnects += s.reconnects;
            totals.elapsed = totals.elapsed.max(s.elapsed);
        }
        totals
    }

    /// Log a summary line per stream.
    pub fn log_summary(&self) {
        for (stream, s) in self.snapshot_all() {
            info!(
                %stream,
                messages = s.messages,
                msgs_per_sec = s.messages_per_sec(),
                gaps = s.gap_events,
                missing = s.missing_sequences,
                avg_latency_us = s.average_latency_us(),
                max_latency_us = s.max_latency_us,
                reconnects = s.reconnects,
                "Stream statistics"
            );
        }
    }
}
