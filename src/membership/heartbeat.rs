//! Adaptive heartbeat interval.
//!
//! Churn halves the interval immediately (floored at `min_interval`); a run of
//! `stability_threshold` quiet cycles stretches it by 1.5x (capped at
//! `max_interval`).
//!
//! A node running with staleness eviction must beat well inside the threshold,
//! so `for_stale_threshold` caps the interval at half of it.

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::HeartbeatConfig;

const BACKOFF_FACTOR: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct AdaptiveHeartbeatController {
    base_interval: Duration,
    min_interval: Duration,
    max_interval: Duration,
    current_interval: Duration,
    stability_threshold: u32,
    stable_cycles: u32,
    last_cluster_change: Instant,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HeartbeatStats {
    pub current_interval_ms: u64,
    pub base_interval_ms: u64,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    pub stable_cycles: u32,
    pub stability_threshold: u32,
    pub seconds_since_last_change: u64,
}

impl AdaptiveHeartbeatController {
    pub fn new(config: &HeartbeatConfig) -> Self {
        let min_interval = config.min_interval.min(config.max_interval);
        let max_interval = config.max_interval.max(min_interval);
        let base_interval = config.base_interval.clamp(min_interval, max_interval);
        Self {
            base_interval,
            min_interval,
            max_interval,
            current_interval: base_interval,
            stability_threshold: config.stability_threshold.max(1),
            stable_cycles: 0,
            last_cluster_change: Instant::now(),
        }
    }

    /// Like `new`, but `max_interval` never exceeds half of `stale_threshold`,
    /// so a peer that misses one beat is still considered alive.
    pub fn for_stale_threshold(config: &HeartbeatConfig, stale_threshold: Duration) -> Self {
        let mut controller = Self::new(config);
        let ceiling = (stale_threshold / 2).max(controller.min_interval);
        if controller.max_interval > ceiling {
            tracing::debug!(
                "Heartbeat ceiling lowered from {:?} to {:?} (stale threshold {:?})",
                controller.max_interval,
                ceiling,
                stale_threshold
            );
            controller.max_interval = ceiling;
            controller.base_interval = controller.base_interval.min(ceiling);
            controller.current_interval = controller.base_interval;
        }
        controller
    }

    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    pub fn record_stable_cycle(&mut self) {
        self.stable_cycles += 1;
        if self.stable_cycles >= self.stability_threshold {
            let next = self
                .current_interval
                .mul_f64(BACKOFF_FACTOR)
                .min(self.max_interval);
            if next != self.current_interval {
                tracing::debug!(
                    "Cluster stable, heartbeat interval {:?} -> {:?}",
                    self.current_interval,
                    next
                );
            }
            self.current_interval = next;
            self.stable_cycles = 0;
        }
    }

    pub fn record_activity(&mut self) {
        self.stable_cycles = 0;
        self.last_cluster_change = Instant::now();
        let next = (self.current_interval / 2).max(self.min_interval);
        if next != self.current_interval {
            tracing::debug!(
                "Cluster activity, heartbeat interval {:?} -> {:?}",
                self.current_interval,
                next
            );
        }
        self.current_interval = next;
    }

    /// True if nothing changed in the cluster for at least `threshold`.
    pub fn is_stable(&self, threshold: Duration) -> bool {
        self.last_cluster_change.elapsed() >= threshold
    }

    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            current_interval_ms: self.current_interval.as_millis() as u64,
            base_interval_ms: self.base_interval.as_millis() as u64,
            min_interval_ms: self.min_interval.as_millis() as u64,
            max_interval_ms: self.max_interval.as_millis() as u64,
            stable_cycles: self.stable_cycles,
            stability_threshold: self.stability_threshold,
            seconds_since_last_change: self.last_cluster_change.elapsed().as_secs(),
        }
    }
}

impl Default for AdaptiveHeartbeatController {
    fn default() -> Self {
        Self::new(&HeartbeatConfig::default())
    }
}
