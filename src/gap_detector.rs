//! Sequence number gap detection
//!
//! Tracks the last sequence number seen per (exchange, instrument) stream and
//! reports every arrival that is not exactly `last + 1`. Detection never
//! blocks delivery: the cursor moves to the received number and the event
//! continues downstream. Backfill is left to the adapter.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::event::StreamKey;

/// Number of recent gaps kept for inspection.
pub const RECENT_GAP_HISTORY: usize = 64;

/// A discontinuity in one stream's sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceGap {
    pub stream: StreamKey,
    pub expected: i64,
    pub received: i64,
}

impl SequenceGap {
    /// Sequence numbers skipped over; zero for duplicates and regressions.
    pub fn missing(&self) -> u64 {
        self.received.saturating_sub(self.expected).max(0) as u64
    }

    /// The stream went backwards (replay, duplicate or reset).
    pub fn is_regression(&self) -> bool {
        self.received < self.expected
    }

    /// True if `sequence` was skipped by this gap.
    pub fn contains(&self, sequence: i64) -> bool {
        sequence >= self.expected && sequence < self.received
    }
}

#[derive(Debug, Clone)]
pub struct GapDetector {
    last_sequence: HashMap<StreamKey, i64>,
    recent: VecDeque<SequenceGap>,
    gap_count: u64,
    total_missing: u64,
}

impl GapDetector {
    pub fn new() -> Self {
        GapDetector {
            last_sequence: HashMap::new(),
            recent: VecDeque::with_capacity(RECENT_GAP_HISTORY),
            gap_count: 0,
            total_missing: 0,
        }
    }

    /// Record `sequence` for `stream`, returning the gap if it is not the
    /// successor of the previous one. The first number seen on a stream is
    /// always accepted.
    pub fn process(&mut self, stream: StreamKey, sequence: i64) -> Option<SequenceGap> {
        let previous = self.last_sequence.insert(stream, sequence)?;
        let expected = previous.wrapping_add(1);
        if sequence == expected {
            return None;
        }

        let gap = SequenceGap {
            stream,
            expected,
            received: sequence,
        };
        self.gap_count += 1;
        self.total_missing += gap.missing();

        if self.recent.len() >= RECENT_GAP_HISTORY {
            self.recent.pop_front();
        }
        self.recent.push_back(gap);
        Some(gap)
    }

    pub fn last_sequence(&self, stream: StreamKey) -> Option<i64> {
        self.last_sequence.get(&stream).copied()
    }

    /// Forget a stream's cursor, e.g. after the adapter resubscribed. The
    /// next number seen on it is accepted without a gap.
    pub fn reset_stream(&mut self, stream: StreamKey) {
        self.last_sequence.remove(&stream);
    }

    /// Most recent gaps, oldest first.
    pub fn recent_gaps(&self) -> impl Iterator<Item = &SequenceGap> {
        self.recent.iter()
    }

    /// Check whether `sequence` on `stream` fell into a recently seen gap.
    pub fn is_in_gap(&self, stream: StreamKey, sequence: i64) -> bool {
        self.recent
            .iter()
            .any(|gap| gap.stream == stream && gap.contains(sequence))
    }

    /// Count of gap events across all streams.
    pub fn gap_count(&self) -> u64 {
        self.gap_count
    }

    /// Total sequence numbers skipped across all streams.
    pub fn total_missing(&self) -> u64 {
        self.total_missing
    }

    pub fn stream_count(&self) -> usize {
        self.last_sequence.len()
    }

    pub fn reset(&mut self) {
        self.last_sequence.clear();
        self.recent.clear();
        self.gap_count = 0;
        self.total_missing = 0;
    }
}

impl Default for GapDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ExchangeId, InstrumentId};

    const A: StreamKey = StreamKey::new(ExchangeId(1), InstrumentId(1));
    const B: StreamKey = StreamKey::new(ExchangeId(2), InstrumentId(1));

    #[test]
    fn test_no_gaps() {
        let mut detector = GapDetector::new();
        for i in 0..100 {
            assert_eq!(detector.process(A, i), None);
        }
        assert_eq!(detector.gap_count(), 0);
        assert_eq!(detector.recent_gaps().count(), 0);
    }

    #[test]
    fn test_single_gap() {
        let mut detector = GapDetector::new();
        detector.process(A, 1);
        detector.process(A, 2);
        let gap = detector.process(A, 5).unwrap(); // gap: 3, 4
        assert_eq!(detector.process(A, 6), None);

        assert_eq!(gap.expected, 3);
        assert_eq!(gap.received, 5);
        assert_eq!(gap.missing(), 2);
        assert_eq!(detector.gap_count(), 1);
        assert_eq!(detector.total_missing(), 2);
    }

    #[test]
    fn test_streams_are_independent() {
        let mut detector = GapDetector::new();
        detector.process(A, 1);
        detector.process(B, 100);
        assert_eq!(detector.process(A, 2), None);
        assert_eq!(detector.process(B, 101), None);
        assert!(detector.process(B, 103).is_some());
        assert_eq!(detector.last_sequence(A), Some(2));
        assert_eq!(detector.stream_count(), 2);
    }

    #[test]
    fn test_regression_is_a_gap() {
        let mut detector = GapDetector::new();
        detector.process(A, 10);
        let gap = detector.process(A, 10).unwrap();
        assert!(gap.is_regression());
        assert_eq!(gap.missing(), 0);

        // cursor follows the received number
        assert_eq!(detector.process(A, 11), None);
    }

    #[test]
    fn test_is_in_gap() {
        let mut detector = GapDetector::new();
        detector.process(A, 1);
        detector.process(A, 5);
        detector.process(A, 10);

        assert!(detector.is_in_gap(A, 2));
        assert!(detector.is_in_gap(A, 4));
        assert!(!detector.is_in_gap(A, 1));
        assert!(!detector.is_in_gap(A, 5));
        assert!(detector.is_in_gap(A, 9));
        assert!(!detector.is_in_gap(A, 10));
        assert!(!detector.is_in_gap(B, 3));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut detector = GapDetector::new();
        for i in 0..(RECENT_GAP_HISTORY as i64 * 2) {
            detector.process(A, i * 2);
        }
        assert_eq!(detector.recent_gaps().count(), RECENT_GAP_HISTORY);
        assert_eq!(detector.gap_count(), RECENT_GAP_HISTORY as u64 * 2 - 1);
    }

    #[test]
    fn test_reset() {
        let mut detector = GapDetector::new();
        detector.process(A, 1);
        detector.process(A, 5);
        detector.reset_stream(A);
        assert_eq!(detector.process(A, 42), None);

        detector.reset();
        assert_eq!(detector.gap_count(), 0);
        assert_eq!(detector.stream_count(), 0);
    }
}
