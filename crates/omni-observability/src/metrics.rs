use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

const MAX_TIMING_SAMPLES: usize = 1000;

#[derive(Debug, Clone, Copy)]
struct TimingSample {
    duration: Duration,
    success: bool,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct TimingStats {
    pub count: usize,
    pub min_ms: u128,
    pub max_ms: u128,
    pub avg_ms: f64,
    pub success_rate: f64,
}

fn stats_from(samples: &VecDeque<TimingSample>) -> TimingStats {
    if samples.is_empty() {
        return TimingStats::default();
    }
    let count = samples.len();
    let successes = samples.iter().filter(|s| s.success).count();
    let min_ms = samples.iter().map(|s| s.duration.as_millis()).min().unwrap_or(0);
    let max_ms = samples.iter().map(|s| s.duration.as_millis()).max().unwrap_or(0);
    let total_ms: u128 = samples.iter().map(|s| s.duration.as_millis()).sum();
    TimingStats {
        count,
        min_ms,
        max_ms,
        avg_ms: total_ms as f64 / count as f64,
        success_rate: successes as f64 / count as f64,
    }
}

/// Counters, gauges, and ring-buffered timing samples (capped at 1000 per
/// operation, most-recent wins).
#[derive(Default)]
pub struct Metrics {
    counters: RwLock<HashMap<String, u64>>,
    gauges: RwLock<HashMap<String, f64>>,
    timings: RwLock<HashMap<String, VecDeque<TimingSample>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_counter(&self, name: &str, by: u64) {
        *self.counters.write().entry(name.to_string()).or_insert(0) += by;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.read().get(name).copied().unwrap_or(0)
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.gauges.write().insert(name.to_string(), value);
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.read().get(name).copied()
    }

    /// Records one timing sample for `operation`, evicting the oldest
    /// sample once the ring buffer would exceed [`MAX_TIMING_SAMPLES`].
    pub fn record_timing(&self, operation: &str, duration: Duration, success: bool) {
        let mut timings = self.timings.write();
        let samples = timings.entry(operation.to_string()).or_default();
        samples.push_back(TimingSample { duration, success });
        while samples.len() > MAX_TIMING_SAMPLES {
            samples.pop_front();
        }
    }

    pub fn timing_stats(&self, operation: &str) -> TimingStats {
        self.timings
            .read()
            .get(operation)
            .map(stats_from)
            .unwrap_or_default()
    }

    /// Starts a scoped timing primitive for `operation`; the caller must
    /// call `finish` exactly once (a drop without `finish` records a
    /// failed sample so forgotten timers don't vanish silently).
    pub fn timed_operation<'a>(&'a self, operation: &str) -> TimedOperation<'a> {
        TimedOperation {
            metrics: self,
            operation: operation.to_string(),
            start: Instant::now(),
            finished: false,
        }
    }
}

pub struct TimedOperation<'a> {
    metrics: &'a Metrics,
    operation: String,
    start: Instant,
    finished: bool,
}

impl TimedOperation<'_> {
    pub fn finish(mut self, success: bool) {
        self.metrics.record_timing(&self.operation, self.start.elapsed(), success);
        self.finished = true;
    }
}

impl Drop for TimedOperation<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.metrics.record_timing(&self.operation, self.start.elapsed(), false);
        }
    }
}
