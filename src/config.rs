//! Pipeline configuration
//!
//! Plain data with defaults. Loading from files or the environment belongs to
//! the embedding service; this only deserializes and validates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order_book::TradePolicy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ring_capacity must be a non-zero power of two, got {0}")]
    RingCapacity(usize),

    #[error("gap_alert_capacity must be non-zero")]
    GapAlertCapacity,

    #[error("snapshot_depth must be non-zero")]
    SnapshotDepth,
}

/// What happens to buffered events when the ingest loop is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Dispatch everything still buffered before returning.
    #[default]
    Drain,
    /// Drop what is buffered and report how many were dropped.
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ring_capacity: usize,
    pub gap_alert_capacity: usize,
    pub snapshot_depth: usize,
    /// Applied events between published book snapshots; 0 disables.
    pub snapshot_interval: u64,
    pub trade_policy: TradePolicy,
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            ring_capacity: 65_536,
            gap_alert_capacity: 1_024,
            snapshot_depth: 20,
            snapshot_interval: 100,
            trade_policy: TradePolicy::Informational,
            shutdown_policy: ShutdownPolicy::Drain,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ring_capacity.is_power_of_two() {
            return Err(ConfigError::RingCapacity(self.ring_capacity));
        }
        if self.gap_alert_capacity == 0 {
            return Err(ConfigError::GapAlertCapacity);
        }
        if self.snapshot_depth == 0 {
            return Err(ConfigError::SnapshotDepth);
        }
        Ok(())
    }
}
